//! Face enrollment, face login and camera diagnostics.

use crate::context::AppContext;
use anyhow::{anyhow, bail, Context, Result};
use roster_client::LOGIN_ROUTE;
use roster_core::{EnrollmentStatus, RecordId, VerifiedIdentity};
use roster_face::{
    CameraController, CaptureOutcome, EnrollmentSession, VerificationSession, VerifyAttempt,
    AUTO_CLOSE_DELAY, SETTLE_DELAY,
};
use roster_hw::V4lDevice;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;

pub async fn status(ctx: &AppContext, id: RecordId) -> Result<()> {
    let status = ctx
        .api
        .face_status(&id)
        .await
        .map_err(|e| anyhow!(e.user_message("Failed to load face recognition status")))?;
    println!("{}", describe_status(&status));
    Ok(())
}

fn describe_status(status: &EnrollmentStatus) -> String {
    if !status.enrolled {
        return "Not enrolled".to_string();
    }
    let state = if status.is_enabled { "enabled" } else { "disabled" };
    match status.enrolled_at {
        Some(at) => format!("Enrolled ({state}) since {}", at.format("%Y-%m-%d %H:%M")),
        None => format!("Enrolled ({state})"),
    }
}

pub async fn toggle(ctx: &AppContext, id: RecordId, enabled: bool) -> Result<()> {
    ctx.api
        .toggle_face(&id, enabled)
        .await
        .map_err(|e| anyhow!(e.user_message("Failed to update face login")))?;
    println!("Face login {} for {id}.", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

pub async fn remove(ctx: &AppContext, id: RecordId) -> Result<()> {
    ctx.api
        .remove_face(&id)
        .await
        .map_err(|e| anyhow!(e.user_message("Failed to remove face enrollment")))?;
    println!("Face enrollment removed for {id}.");
    Ok(())
}

/// Wait for Enter. Returns false on `q` or end of input.
async fn wait_for_enter(lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>, prompt: &str) -> Result<bool> {
    println!("{prompt}");
    match lines.next_line().await? {
        Some(line) => Ok(!line.trim().eq_ignore_ascii_case("q")),
        None => Ok(false),
    }
}

pub async fn enroll(ctx: &AppContext, id: RecordId) -> Result<()> {
    let loader = ctx.loader();
    let mut session = EnrollmentSession::open(
        ctx.device(),
        &loader,
        ctx.api.clone(),
        id.clone(),
        SETTLE_DELAY,
    )?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if !wait_for_enter(&mut lines, "Look at the camera and press Enter to capture (q to cancel).").await? {
            session.close();
            println!("Enrollment cancelled.");
            return Ok(());
        }
        match session.capture_face().await {
            Ok(CaptureOutcome::NoFace) => {
                println!("No face detected. Please look at the camera and try again.");
            }
            Ok(CaptureOutcome::Enrolled(status)) => {
                println!("Face enrolled for {id}. {}", describe_status(&status));
                tokio::time::sleep(AUTO_CLOSE_DELAY).await;
                return Ok(());
            }
            Err(e) => {
                session.close();
                return Err(e).context("face enrollment failed");
            }
        }
    }
}

/// Face login. Retries until a match, `q`, or end of input; a failed match
/// leaves password login available.
pub async fn login(ctx: &AppContext) -> Result<()> {
    ctx.navigator.enter(LOGIN_ROUTE);
    let loader = ctx.loader();
    let (tx, rx) = oneshot::channel::<VerifiedIdentity>();
    let mut session = VerificationSession::open(
        ctx.device(),
        &loader,
        ctx.api.clone(),
        SETTLE_DELAY,
        move |identity| {
            let _ = tx.send(identity);
        },
    )?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if !wait_for_enter(&mut lines, "Look at the camera and press Enter to sign in (q to cancel).").await? {
            session.close();
            println!("Face login cancelled. Use `roster login` to sign in with a password.");
            return Ok(());
        }
        match session.verify_face().await {
            Ok(VerifyAttempt::NoFace) => {
                println!("No face detected. Please look at the camera and try again.");
            }
            Ok(VerifyAttempt::NotRecognized { message }) => {
                println!("{}", message.unwrap_or_else(|| "Face not recognized.".to_string()));
            }
            Ok(VerifyAttempt::Matched) => break,
            Err(e) => {
                session.close();
                return Err(e).context("face login failed");
            }
        }
    }

    let identity = rx.await.map_err(|_| anyhow!("face login finished without an identity"))?;
    if !ctx.api.adopt_identity(&identity)? {
        bail!("server recognized {} but issued no session", identity.display_name());
    }
    println!("Welcome, {}.", identity.display_name());
    Ok(())
}

pub fn devices() {
    let devices = V4lDevice::list_devices();
    if devices.is_empty() {
        println!("No video capture devices found.");
        return;
    }
    for d in devices {
        let facing = if d.looks_user_facing() { "user-facing" } else { "" };
        println!("{:<14} {:<32} {:<12} {:<20} {facing}", d.path, d.name, d.driver, d.bus);
    }
}

/// Grab one frame after the settle delay and write it as a grayscale PNG.
pub async fn snapshot(ctx: &AppContext, output: &Path) -> Result<()> {
    let camera = CameraController::new(ctx.device());
    let output = output.to_path_buf();
    let saved = tokio::task::spawn_blocking(move || -> Result<(u32, u32, f32, bool)> {
        let generation = camera.start()?;
        std::thread::sleep(SETTLE_DELAY);
        let frame = camera.grab_frame(generation);
        camera.stop();
        let frame = frame?.ok_or_else(|| anyhow!("camera stopped before a frame arrived"))?;

        let (width, height) = (frame.width, frame.height);
        let (brightness, dark) = (frame.avg_brightness(), frame.is_dark());
        let image = image::GrayImage::from_raw(width, height, frame.data)
            .ok_or_else(|| anyhow!("frame buffer does not match {width}x{height}"))?;
        image
            .save(&output)
            .with_context(|| format!("writing {}", output.display()))?;
        Ok((width, height, brightness, dark))
    })
    .await
    .map_err(|e| anyhow!("snapshot worker failed: {e}"))??;

    let (width, height, brightness, dark) = saved;
    println!("Saved {width}x{height} frame (avg brightness {brightness:.1}).");
    if dark {
        println!("Warning: the frame is almost black. Is the lens covered?");
    }
    Ok(())
}
