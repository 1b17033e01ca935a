use image::{Rgb, RgbImage};

/// Blend `color` over the pixel at (x, y) with coverage `alpha`.
pub fn blend(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>, alpha: f32) {
    if x < 0 || y < 0 || x >= i64::from(image.width()) || y >= i64::from(image.height()) {
        return;
    }
    let alpha = alpha.clamp(0.0, 1.0);
    let pixel = image.get_pixel_mut(x as u32, y as u32);
    for (dst, src) in pixel.0.iter_mut().zip(color.0) {
        let mixed = f32::from(*dst) * (1.0 - alpha) + f32::from(src) * alpha;
        *dst = mixed.round().clamp(0.0, 255.0) as u8;
    }
}

/// DDA line, one blended sample per step along the major axis.
pub fn draw_line(image: &mut RgbImage, from: (f32, f32), to: (f32, f32), color: Rgb<u8>, alpha: f32) {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as i64;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let x = from.0 + dx * t;
        let y = from.1 + dy * t;
        blend(image, x.round() as i64, y.round() as i64, color, alpha);
    }
}

pub fn fill_disc(image: &mut RgbImage, center: (f32, f32), radius: f32, color: Rgb<u8>) {
    let r = radius.max(0.5);
    let reach = r.ceil() as i64;
    let (cx, cy) = (center.0.round() as i64, center.1.round() as i64);
    for y in -reach..=reach {
        for x in -reach..=reach {
            let d = ((x * x + y * y) as f32).sqrt();
            if d <= r + 0.5 {
                // Soft edge over the last half pixel.
                let coverage = (r + 0.5 - d).min(1.0);
                blend(image, cx + x, cy + y, color, coverage);
            }
        }
    }
}

pub fn draw_cross(image: &mut RgbImage, center: (f32, f32), half: f32, color: Rgb<u8>) {
    let (x, y) = center;
    draw_line(image, (x - half, y - half), (x + half, y + half), color, 1.0);
    draw_line(image, (x - half, y + half), (x + half, y - half), color, 1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_touches_both_endpoints() {
        let mut image = RgbImage::new(16, 16);
        let white = Rgb([255, 255, 255]);
        draw_line(&mut image, (1.0, 1.0), (14.0, 9.0), white, 1.0);
        assert_eq!(*image.get_pixel(1, 1), white);
        assert_eq!(*image.get_pixel(14, 9), white);
    }

    #[test]
    fn out_of_bounds_drawing_is_clipped() {
        let mut image = RgbImage::new(8, 8);
        fill_disc(&mut image, (-20.0, 4.0), 3.0, Rgb([255, 0, 0]));
        draw_line(&mut image, (-5.0, -5.0), (20.0, 20.0), Rgb([0, 255, 0]), 0.5);
        assert_eq!(image.get_pixel(4, 4).0[1], 128);
    }
}
