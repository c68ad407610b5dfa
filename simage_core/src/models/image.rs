use crate::error::{Result, SimageError};

use super::pixel::Pixel;

/// Order of the colour channels inside one pixel. Grey and grey+alpha pixels are not affected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentOrder {
    Rgb,
    Bgr,
}

impl Default for ComponentOrder {
    fn default() -> Self {
        ComponentOrder::Rgb
    }
}

enum Storage<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a mut [u8]),
}

impl Storage<'_> {

    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => v,
            Storage::Borrowed(v) => v,
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Storage::Owned(v) => v,
            Storage::Borrowed(v) => v,
        }
    }
}

/// In-memory image: `width * height * components * layers` bytes, rows top to bottom.
///
/// Storage is either owned by the image or borrowed from the caller. Borrowed storage
/// (from [`Image::wrap`] or [`Image::set_borrowed`]) is never owned and never freed by
/// the image, whatever happens to it later. Ownership only moves into an image when a
/// `Vec` is handed over explicitly, with [`Image::from_vec`] or [`Image::set_owned`].
pub struct Image<'a> {
    width: usize,
    height: usize,
    components: usize,
    layers: usize,
    order: ComponentOrder,
    data: Storage<'a>,
}

impl Image<'static> {

    pub fn new(width: usize, height: usize, components: usize) -> Result<Self> {
        Self::new_layered(width, height, 1, components)
    }

    pub fn new_layered(width: usize, height: usize, layers: usize, components: usize) -> Result<Self> {
        let len = payload_len(width, height, components, layers)?;
        Ok(Image {
            width,
            height,
            components,
            layers,
            order: ComponentOrder::Rgb,
            data: Storage::Owned(vec![0; len]),
        })
    }

    pub fn from_vec(width: usize, height: usize, components: usize, data: Vec<u8>) -> Result<Self> {
        check_len(width, height, components, data.len())?;
        Ok(Image {
            width,
            height,
            components,
            layers: 1,
            order: ComponentOrder::Rgb,
            data: Storage::Owned(data),
        })
    }
}

impl<'a> Image<'a> {

    /// Wraps preallocated caller memory without copying it.
    pub fn wrap(width: usize, height: usize, components: usize, data: &'a mut [u8]) -> Result<Self> {
        check_len(width, height, components, data.len())?;
        Ok(Image {
            width,
            height,
            components,
            layers: 1,
            order: ComponentOrder::Rgb,
            data: Storage::Borrowed(data),
        })
    }

    /// Replaces the image with an owned copy of `data`, dropping any owned payload.
    pub fn set_copied(&mut self, width: usize, height: usize, components: usize, data: &[u8]) -> Result<()> {
        check_len(width, height, components, data.len())?;
        self.describe(width, height, components);
        self.data = Storage::Owned(data.to_vec());
        Ok(())
    }

    /// Points the image at caller memory. The image does not own it.
    pub fn set_borrowed(&mut self, width: usize, height: usize, components: usize, data: &'a mut [u8]) -> Result<()> {
        check_len(width, height, components, data.len())?;
        self.describe(width, height, components);
        self.data = Storage::Borrowed(data);
        Ok(())
    }

    /// Takes ownership of `data`.
    pub fn set_owned(&mut self, width: usize, height: usize, components: usize, data: Vec<u8>) -> Result<()> {
        check_len(width, height, components, data.len())?;
        self.describe(width, height, components);
        self.data = Storage::Owned(data);
        Ok(())
    }

    fn describe(&mut self, width: usize, height: usize, components: usize) {
        self.width = width;
        self.height = height;
        self.components = components;
        self.layers = 1;
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn layers(&self) -> usize {
        self.layers
    }

    pub fn data(&self) -> &[u8] {
        self.data.bytes()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data.bytes_mut()
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.data, Storage::Owned(_))
    }

    pub fn row_len(&self) -> usize {
        self.width * self.components
    }

    /// One row of the first layer, `y = 0` being the top.
    pub fn row(&self, y: usize) -> &[u8] {
        let len = self.row_len();
        &self.data()[y * len..(y + 1) * len]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let len = self.row_len();
        &mut self.data_mut()[y * len..(y + 1) * len]
    }

    /// Detaches the image from borrowed storage by copying it.
    pub fn into_owned(self) -> Image<'static> {
        let data = match self.data {
            Storage::Owned(v) => v,
            Storage::Borrowed(v) => v.to_vec(),
        };
        Image {
            width: self.width,
            height: self.height,
            components: self.components,
            layers: self.layers,
            order: self.order,
            data: Storage::Owned(data),
        }
    }

    /// Copies `source` into this image: in place when the shapes agree (so borrowed storage
    /// is written through), otherwise by replacing the payload with an owned copy.
    pub fn copy_from(&mut self, source: &Image) -> Result<()> {
        let same_shape = source.width == self.width
            && source.height == self.height
            && source.components == self.components
            && source.layers == self.layers;

        if same_shape {
            self.data_mut().copy_from_slice(source.data());
        } else {
            if source.layers != 1 {
                return Err(SimageError::invalid_image("cannot resize a layered image"));
            }
            self.set_copied(source.width, source.height, source.components, source.data())?;
        }
        self.order = source.order;
        Ok(())
    }

    pub fn component_order(&self) -> ComponentOrder {
        self.order
    }

    /// Changes the order tag only. The bytes are left as they are, so after this call they
    /// are interpreted differently; use [`Image::convert_component_order`] to re-pack them.
    pub fn set_component_order(&mut self, order: ComponentOrder) {
        self.order = order;
    }

    /// Swaps red and blue in every pixel when `order` differs from the current one.
    pub fn convert_component_order(&mut self, order: ComponentOrder) {
        if order == self.order {
            return;
        }

        if self.components >= 3 {
            let components = self.components;
            for pixel in self.data_mut().chunks_exact_mut(components) {
                pixel.swap(0, 2);
            }
        }
        self.order = order;
    }

    pub fn get_pixel(&self, x: usize, y: usize) -> Pixel {
        let offset = self.pixel_offset(x, y);
        Pixel::from_components(&self.data()[offset..offset + self.components], self.order)
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, pixel: Pixel) {
        let offset = self.pixel_offset(x, y);
        let (components, order) = (self.components, self.order);
        pixel.write_components(&mut self.data_mut()[offset..offset + components], order);
    }

    pub fn fill(&mut self, color: Pixel) {
        for y in 0..self.height {
            for x in 0..self.width {
                self.set_pixel(x, y, color);
            }
        }
    }

    fn pixel_offset(&self, x: usize, y: usize) -> usize {
        (y * self.width + x) * self.components
    }
}

impl std::fmt::Debug for Image<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("components", &self.components)
            .field("layers", &self.layers)
            .field("order", &self.order)
            .field("owned", &self.is_owned())
            .finish()
    }
}

pub fn payload_len(width: usize, height: usize, components: usize, layers: usize) -> Result<usize> {
    if width == 0 || height == 0 || layers == 0 {
        return Err(SimageError::invalid_image(format!("empty image: {}x{}x{}", width, height, layers)));
    }
    if !(1..=4).contains(&components) {
        return Err(SimageError::invalid_image(format!("unsupported number of components: {}", components)));
    }

    width.checked_mul(height)
        .and_then(|v| v.checked_mul(components))
        .and_then(|v| v.checked_mul(layers))
        .ok_or_else(|| SimageError::invalid_image(format!("image is too large: {}x{}x{}", width, height, layers)))
}

fn check_len(width: usize, height: usize, components: usize, actual: usize) -> Result<()> {
    let expected = payload_len(width, height, components, 1)?;
    if expected != actual {
        return Err(SimageError::invalid_image(format!(
            "expected {} bytes for {}x{} with {} components, got {}", expected, width, height, components, actual
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn test_image() -> Image<'static> {
        let mut image = Image::new(4, 4, 3).expect("valid dimensions");

        let white = Pixel::from_rgb(255, 255, 255);
        let blue = Pixel::from_rgb(3, 155, 229);
        let red = Pixel::from_rgb(221, 47, 47);

        image.fill(white);
        image.set_pixel(1, 1, blue);
        image.set_pixel(2, 1, blue);
        image.set_pixel(1, 2, blue);
        image.set_pixel(2, 2, red);

        image
    }

    #[test]
    fn new_image_has_full_payload() {
        for (w, h, c) in [(1, 1, 1), (3, 5, 2), (7, 2, 3), (4, 4, 4)] {
            let image = Image::new(w, h, c).expect("valid dimensions");
            assert_eq!(image.data().len(), w * h * c);
            assert!(image.is_owned());
        }

        let volume = Image::new_layered(2, 2, 3, 4).expect("valid dimensions");
        assert_eq!(volume.data().len(), 2 * 2 * 3 * 4);
        assert_eq!(volume.layers(), 3);
    }

    #[test]
    fn rejects_invalid_dimensions() {
        assert!(Image::new(0, 4, 3).is_err());
        assert!(Image::new(4, 4, 5).is_err());
        assert!(Image::from_vec(2, 2, 3, vec![0; 11]).is_err());
        assert!(Image::new(usize::MAX, 2, 4).is_err());
    }

    #[test]
    fn wrapped_memory_is_not_copied() {
        let mut memory = vec![0u8; 2 * 2 * 3];
        {
            let mut image = Image::wrap(2, 2, 3, &mut memory).expect("valid dimensions");
            assert!(!image.is_owned());
            image.set_pixel(1, 0, Pixel::from_rgb(10, 20, 30));
        }
        assert_eq!(&memory[3..6], &[10, 20, 30]);
    }

    #[test]
    fn set_copied_keeps_length_invariant() {
        let mut memory = vec![7u8; 12];
        let mut image = Image::wrap(2, 2, 3, &mut memory).expect("valid dimensions");

        image.set_copied(3, 1, 2, &[1, 2, 3, 4, 5, 6]).expect("valid dimensions");
        assert!(image.is_owned());
        assert_eq!(image.data().len(), 3 * 1 * 2);
        assert_eq!((image.width(), image.height(), image.components()), (3, 1, 2));

        assert!(image.set_copied(3, 1, 2, &[1, 2, 3]).is_err());
        assert_eq!(image.data().len(), 6);
    }

    #[test]
    fn set_borrowed_does_not_take_ownership() {
        let mut first = vec![1u8; 4];
        let mut second = vec![9u8; 2];
        let mut image = Image::wrap(2, 2, 1, &mut first).expect("valid dimensions");

        image.set_borrowed(2, 1, 1, &mut second).expect("valid dimensions");
        image.data_mut()[0] = 5;
        assert!(!image.is_owned());
        drop(image);

        assert_eq!(first, vec![1, 1, 1, 1]);
        assert_eq!(second, vec![5, 9]);
    }

    #[test]
    fn component_order_tag_does_not_touch_bytes() {
        let mut image = test_image();
        let before = image.data().to_vec();

        image.set_component_order(ComponentOrder::Bgr);
        assert_eq!(image.data(), before.as_slice());
        assert_eq!(image.get_pixel(2, 2), Pixel::from_rgb(47, 47, 221));
    }

    #[test]
    fn convert_component_order_repacks_bytes() {
        let mut image = test_image();
        image.convert_component_order(ComponentOrder::Bgr);

        assert_eq!(image.component_order(), ComponentOrder::Bgr);
        assert_eq!(image.get_pixel(2, 2), Pixel::from_rgb(221, 47, 47));
        assert_eq!(&image.row(2)[6..9], &[47, 47, 221]);
    }

    #[test]
    fn into_owned_detaches_from_borrowed_memory() {
        let mut memory = vec![3u8; 3];
        let image = Image::wrap(1, 1, 3, &mut memory).expect("valid dimensions").into_owned();
        memory[0] = 0;

        assert!(image.is_owned());
        assert_eq!(image.data(), &[3, 3, 3]);
    }
}
