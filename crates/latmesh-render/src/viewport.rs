/// Maps layout coordinates onto pixel space, y pointing up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    center: [f64; 2],
    scale: f64,
    width: u32,
    height: u32,
}

impl Viewport {
    /// Fit every point (and the origin) inside the image with `margin`
    /// pixels to spare on each side.
    pub fn fit<'a, I>(points: I, width: u32, height: u32, margin: u32) -> Self
    where
        I: IntoIterator<Item = &'a [f64; 2]>,
    {
        let mut min = [0.0_f64, 0.0];
        let mut max = [0.0_f64, 0.0];
        for p in points {
            min[0] = min[0].min(p[0]);
            min[1] = min[1].min(p[1]);
            max[0] = max[0].max(p[0]);
            max[1] = max[1].max(p[1]);
        }

        let usable_w = f64::from(width.saturating_sub(2 * margin).max(1));
        let usable_h = f64::from(height.saturating_sub(2 * margin).max(1));
        let span_x = (max[0] - min[0]).max(1e-9);
        let span_y = (max[1] - min[1]).max(1e-9);
        let scale = (usable_w / span_x).min(usable_h / span_y);

        Self {
            center: [(min[0] + max[0]) * 0.5, (min[1] + max[1]) * 0.5],
            scale,
            width,
            height,
        }
    }

    pub fn project(&self, point: [f64; 2]) -> (f32, f32) {
        let x = f64::from(self.width) * 0.5 + (point[0] - self.center[0]) * self.scale;
        let y = f64::from(self.height) * 0.5 - (point[1] - self.center[1]) * self.scale;
        (x as f32, y as f32)
    }
}
