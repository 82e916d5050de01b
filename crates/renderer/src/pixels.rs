/// Borrowed, tightly packed RGBA8 pixels.
#[derive(Debug, Clone, Copy)]
pub struct PixelView<'a> {
    pub width: u32,
    pub height: u32,
    pub rgba: &'a [u8],
}

impl PixelView<'_> {
    /// True when the buffer holds exactly `width * height` texels.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgba.len() == self.width as usize * self.height as usize * 4
    }
}

/// Anything a layer can upload as a texture.
///
/// Returns `None` while the pixels are not yet decodable; binding such a
/// source is a no-op and the caller retries on a later frame.
pub trait ImageSource {
    fn pixels(&self) -> Option<PixelView<'_>>;
}

impl ImageSource for image::RgbaImage {
    fn pixels(&self) -> Option<PixelView<'_>> {
        let view = PixelView {
            width: self.width(),
            height: self.height(),
            rgba: self.as_raw(),
        };
        view.is_well_formed().then_some(view)
    }
}

/// Owned RGBA8 buffer written by the droplet simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelSurface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelSurface {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Index of the first byte of texel `(x, y)`, if in bounds.
    pub fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * 4)
    }
}

impl ImageSource for PixelSurface {
    fn pixels(&self) -> Option<PixelView<'_>> {
        Some(PixelView {
            width: self.width,
            height: self.height,
            rgba: &self.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_is_never_empty() {
        let surface = PixelSurface::new(0, 3);
        assert_eq!((surface.width(), surface.height()), (1, 3));
        assert_eq!(surface.data().len(), 12);
        assert!(surface.pixels().map(|view| view.is_well_formed()).unwrap_or(false));
    }

    #[test]
    fn offsets_respect_bounds() {
        let surface = PixelSurface::new(4, 2);
        assert_eq!(surface.offset(0, 0), Some(0));
        assert_eq!(surface.offset(3, 1), Some(28));
        assert_eq!(surface.offset(4, 0), None);
        assert_eq!(surface.offset(-1, 0), None);
    }
}
