//! Five-point similarity alignment onto the 112x112 ArcFace template.

pub(crate) const ALIGNED_SIZE: usize = 112;

/// insightface reference points: eyes, nose tip, mouth corners.
pub(crate) const TEMPLATE: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

/// `dst = [a -b; b a] * src + t`
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    /// Least-squares fit mapping `src` points onto `dst` points.
    pub(crate) fn fit(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let n = src.len() as f32;
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (msx, msy) = mean(src);
        let (mdx, mdy) = mean(dst);

        let (mut dot, mut cross, mut var) = (0.0f32, 0.0f32, 0.0f32);
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (sx - msx, sy - msy);
            let (dx, dy) = (dx - mdx, dy - mdy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            var += sx * sx + sy * sy;
        }

        if var < 1e-12 {
            return Self {
                a: 1.0,
                b: 0.0,
                tx: mdx - msx,
                ty: mdy - msy,
            };
        }

        let a = dot / var;
        let b = cross / var;
        Self {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        }
    }

    pub(crate) fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Inverse mapping, or `None` for a degenerate (zero-scale) transform.
    pub(crate) fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let (a, b) = (self.a / det, -self.b / det);
        Some(Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

/// Warp the face under `landmarks` into an aligned 112x112 gray crop.
/// Samples falling outside the frame read as black.
pub(crate) fn align_face(gray: &[u8], width: u32, height: u32, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let (w, h) = (width as i64, height as i64);
    let Some(back) = Similarity::fit(landmarks, &TEMPLATE).inverse() else {
        return vec![0; ALIGNED_SIZE * ALIGNED_SIZE];
    };

    let at = |x: i64, y: i64| -> f32 {
        if (0..w).contains(&x) && (0..h).contains(&y) {
            gray.get((y * w + x) as usize).copied().unwrap_or(0) as f32
        } else {
            0.0
        }
    };

    let mut out = Vec::with_capacity(ALIGNED_SIZE * ALIGNED_SIZE);
    for oy in 0..ALIGNED_SIZE {
        for ox in 0..ALIGNED_SIZE {
            let (sx, sy) = back.apply((ox as f32, oy as f32));
            let (x0, y0) = (sx.floor() as i64, sy.floor() as i64);
            let (fx, fy) = (sx - sx.floor(), sy - sy.floor());
            let top = at(x0, y0) * (1.0 - fx) + at(x0 + 1, y0) * fx;
            let bottom = at(x0, y0 + 1) * (1.0 - fx) + at(x0 + 1, y0 + 1) * fx;
            let v = top * (1.0 - fy) + bottom * fy;
            out.push(v.round().clamp(0.0, 255.0) as u8);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f32, f32), b: (f32, f32), tol: f32) -> bool {
        (a.0 - b.0).abs() < tol && (a.1 - b.1).abs() < tol
    }

    #[test]
    fn test_fit_identity() {
        let t = Similarity::fit(&TEMPLATE, &TEMPLATE);
        assert!((t.a - 1.0).abs() < 1e-4);
        assert!(t.b.abs() < 1e-4);
        assert!(t.tx.abs() < 1e-3 && t.ty.abs() < 1e-3);
    }

    #[test]
    fn test_fit_recovers_scale_and_shift() {
        let src = TEMPLATE.map(|(x, y)| (x * 2.0 + 100.0, y * 2.0 + 40.0));
        let t = Similarity::fit(&src, &TEMPLATE);
        assert!((t.a - 0.5).abs() < 1e-3, "a = {}", t.a);
        for (s, d) in src.iter().zip(TEMPLATE.iter()) {
            assert!(close(t.apply(*s), *d, 1e-2));
        }
    }

    #[test]
    fn test_inverse_round_trips_a_point() {
        let t = Similarity {
            a: 0.8,
            b: 0.3,
            tx: 12.0,
            ty: -4.0,
        };
        let inv = t.inverse().unwrap();
        let p = (57.0, 23.0);
        assert!(close(inv.apply(t.apply(p)), p, 1e-3));
        let zero = Similarity { a: 0.0, b: 0.0, tx: 0.0, ty: 0.0 };
        assert!(zero.inverse().is_none());
    }

    #[test]
    fn test_bright_eye_lands_on_template_eye() {
        let (w, h) = (200usize, 200usize);
        let mut gray = vec![0u8; w * h];
        let landmarks = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        for y in 58..63 {
            for x in 78..83 {
                gray[y * w + x] = 255;
            }
        }

        let crop = align_face(&gray, w as u32, h as u32, &landmarks);
        assert_eq!(crop.len(), ALIGNED_SIZE * ALIGNED_SIZE);

        let (ex, ey) = (TEMPLATE[0].0.round() as usize, TEMPLATE[0].1.round() as usize);
        let peak = (ey - 1..=ey + 1)
            .flat_map(|y| (ex - 1..=ex + 1).map(move |x| (x, y)))
            .map(|(x, y)| crop[y * ALIGNED_SIZE + x])
            .max()
            .unwrap();
        assert!(peak > 100, "eye patch peak {peak}");
    }
}
