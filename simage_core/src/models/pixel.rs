use super::image::ComponentOrder;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pixel {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Pixel {

    pub fn zero() -> Self {
        Self::black()
    }

    pub fn white() -> Self {
        Self::from_rgb(255, 255, 255)
    }

    pub fn black() -> Self {
        Self::from_rgb(0, 0, 0)
    }

    pub fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        Self::from_rgba(red, green, blue, 255)
    }

    pub fn from_rgba(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Pixel {
            red,
            green,
            blue,
            alpha,
        }
    }

    pub fn from_luminance(value: u8, alpha: u8) -> Self {
        Self::from_rgba(value, value, value, alpha)
    }

    /// Reads one pixel stored with `components.len()` channels in the given order.
    pub fn from_components(components: &[u8], order: ComponentOrder) -> Self {
        match (components, order) {
            ([l], _) => Self::from_luminance(*l, 255),
            ([l, a], _) => Self::from_luminance(*l, *a),
            ([r, g, b], ComponentOrder::Rgb) => Self::from_rgb(*r, *g, *b),
            ([b, g, r], ComponentOrder::Bgr) => Self::from_rgb(*r, *g, *b),
            ([r, g, b, a], ComponentOrder::Rgb) => Self::from_rgba(*r, *g, *b, *a),
            ([b, g, r, a], ComponentOrder::Bgr) => Self::from_rgba(*r, *g, *b, *a),
            _ => Self::zero(),
        }
    }

    /// Writes this pixel into `out`, using as many channels as `out` is long.
    pub fn write_components(&self, out: &mut [u8], order: ComponentOrder) {
        match (out, order) {
            ([l], _) => *l = self.luminance(),
            ([l, a], _) => {
                *l = self.luminance();
                *a = self.alpha;
            },
            ([r, g, b], ComponentOrder::Rgb) | ([b, g, r], ComponentOrder::Bgr) => {
                *r = self.red;
                *g = self.green;
                *b = self.blue;
            },
            ([r, g, b, a], ComponentOrder::Rgb) | ([b, g, r, a], ComponentOrder::Bgr) => {
                *r = self.red;
                *g = self.green;
                *b = self.blue;
                *a = self.alpha;
            },
            _ => {},
        }
    }

    /// Rec. 601 luma, which is what greyscale savers expect.
    pub fn luminance(&self) -> u8 {
        ((self.red as u32 * 299 + self.green as u32 * 587 + self.blue as u32 * 114) / 1000) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_bgr_components() {
        let pixel = Pixel::from_components(&[3, 155, 229], ComponentOrder::Bgr);
        assert_eq!(pixel, Pixel::from_rgb(229, 155, 3));
    }

    #[test]
    fn writes_luminance_alpha() {
        let mut out = [0u8; 2];
        Pixel::from_rgba(255, 255, 255, 100).write_components(&mut out, ComponentOrder::Rgb);
        assert_eq!(out, [255, 100]);
    }
}
