//! Upcoming reminders and duty assignments.

use roster_core::resource::ApiBase;
use roster_core::{Reminder, SuguanAssignment};

use crate::client::ApiClient;
use crate::error::ApiResult;

pub const REMINDERS_PATH: &str = "reminders/upcoming";
pub const ASSIGNMENTS_PATH: &str = "suguan/upcoming";

impl ApiClient {
    /// Reminders due soon. A row that fails to decode is skipped so the
    /// remaining reminders still fire.
    pub async fn upcoming_reminders(&self) -> ApiResult<Vec<Reminder>> {
        self.get_list_lossy(ApiBase::Main, REMINDERS_PATH).await
    }

    pub async fn upcoming_assignments(&self) -> ApiResult<Vec<SuguanAssignment>> {
        self.get_list_lossy(ApiBase::Main, ASSIGNMENTS_PATH).await
    }
}
