/// In-place separable box blur over tightly packed RGBA8 pixels.
///
/// Works on premultiplied data as well as straight alpha; edges clamp.
pub fn box_blur(rgba: &mut [u8], width: usize, height: usize, radius: usize) {
    if radius == 0 || width == 0 || height == 0 || rgba.len() != width * height * 4 {
        return;
    }
    let mut scratch = vec![0u8; rgba.len()];
    for y in 0..height {
        blur_line(rgba, &mut scratch, y * width * 4, 4, width, radius);
    }
    for x in 0..width {
        blur_line(&scratch, rgba, x * 4, width * 4, height, radius);
    }
}

fn blur_line(
    src: &[u8],
    dst: &mut [u8],
    start: usize,
    stride: usize,
    len: usize,
    radius: usize,
) {
    let window = (2 * radius + 1) as u32;
    let at = |i: isize, channel: usize| -> u32 {
        let clamped = i.clamp(0, len as isize - 1) as usize;
        src[start + clamped * stride + channel] as u32
    };
    for channel in 0..4 {
        let mut sum: u32 = (-(radius as isize)..=radius as isize)
            .map(|i| at(i, channel))
            .sum();
        for i in 0..len {
            dst[start + i * stride + channel] = ((sum + window / 2) / window) as u8;
            let leaving = i as isize - radius as isize;
            let entering = i as isize + radius as isize + 1;
            sum = sum + at(entering, channel) - at(leaving, channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_radius_is_identity() {
        let mut pixels = vec![10, 20, 30, 40, 50, 60, 70, 80];
        let before = pixels.clone();
        box_blur(&mut pixels, 2, 1, 0);
        assert_eq!(pixels, before);
    }

    #[test]
    fn uniform_image_is_unchanged() {
        let mut pixels = vec![200u8; 5 * 4 * 4];
        box_blur(&mut pixels, 5, 4, 2);
        assert!(pixels.iter().all(|&v| v == 200));
    }

    #[test]
    fn spreads_a_single_bright_pixel() {
        let (width, height) = (5, 5);
        let mut pixels = vec![0u8; width * height * 4];
        let centre = (2 * width + 2) * 4;
        pixels[centre..centre + 4].copy_from_slice(&[255, 255, 255, 255]);
        box_blur(&mut pixels, width, height, 1);
        assert!(pixels[centre + 3] < 255);
        let neighbour = (2 * width + 3) * 4;
        assert!(pixels[neighbour + 3] > 0);
        assert_eq!(pixels[3], 0);
    }
}
