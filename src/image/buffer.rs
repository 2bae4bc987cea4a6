//! Typed N-dimensional sample buffers.

use std::sync::Arc;

use super::Interval;

// =============================================================================
// Pixel Kinds
// =============================================================================

/// Numeric kind of an image's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelKind {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
    /// Packed colour triple; not a real-valued kind
    Rgb,
}

impl PixelKind {
    /// Whether samples of this kind have a real-valued interpretation.
    pub fn is_real(self) -> bool {
        !matches!(self, PixelKind::Rgb)
    }

    /// Whether this is the canonical floating-point kind features operate on.
    pub fn is_canonical(self) -> bool {
        matches!(self, PixelKind::F32)
    }
}

/// A colour triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A sample type that can be stored in an [`Image`].
pub trait Sample: Copy + Send + Sync + 'static {
    const KIND: PixelKind;
}

/// A sample with a real-valued interpretation.
pub trait RealSample: Sample {
    /// Convert to the canonical floating-point type.
    fn to_f32(self) -> f32;
}

macro_rules! real_sample {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Sample for $ty {
                const KIND: PixelKind = PixelKind::$kind;
            }

            impl RealSample for $ty {
                #[inline]
                fn to_f32(self) -> f32 {
                    self as f32
                }
            }
        )*
    };
}

real_sample!(
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    f32 => F32,
    f64 => F64,
);

impl Sample for bool {
    const KIND: PixelKind = PixelKind::Bool;
}

impl RealSample for bool {
    #[inline]
    fn to_f32(self) -> f32 {
        if self {
            1.0
        } else {
            0.0
        }
    }
}

impl Sample for Rgb {
    const KIND: PixelKind = PixelKind::Rgb;
}

// =============================================================================
// Image
// =============================================================================

/// A read-only N-dimensional image with samples stored dimension 0 fastest.
///
/// Cloning is cheap: the sample buffer is shared.
#[derive(Debug, Clone)]
pub struct Image<T> {
    interval: Interval,
    data: Arc<[T]>,
}

impl<T: Sample> Image<T> {
    /// Wrap a sample buffer.
    ///
    /// Returns `None` when `data.len()` does not match the product of
    /// `dimensions`.
    pub fn from_vec(dimensions: &[usize], data: Vec<T>) -> Option<Self> {
        let interval = Interval::from_dimensions(dimensions);
        if interval.volume() != data.len() {
            return None;
        }
        Some(Self {
            interval,
            data: data.into(),
        })
    }

    /// Build an image by evaluating `f` at every position.
    pub fn from_fn(dimensions: &[usize], mut f: impl FnMut(&[i64]) -> T) -> Self {
        let interval = Interval::from_dimensions(dimensions);
        let data: Vec<T> = interval.positions().map(|p| f(&p)).collect();
        Self {
            interval,
            data: data.into(),
        }
    }

    pub fn kind(&self) -> PixelKind {
        T::KIND
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    pub fn dimensions(&self) -> Vec<usize> {
        self.interval.dimensions()
    }

    pub fn num_dimensions(&self) -> usize {
        self.interval.num_dimensions()
    }

    /// Sample at an in-bounds position.
    ///
    /// # Panics
    /// Panics if the position lies outside the image.
    #[inline]
    pub fn get(&self, position: &[i64]) -> T {
        self.data[self.interval.offset_of(position)]
    }

    pub fn samples(&self) -> &[T] {
        &self.data
    }

    /// Whether two images share the same sample allocation.
    pub fn shares_buffer(&self, other: &Image<T>) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

// =============================================================================
// Type-Erased Source Image
// =============================================================================

/// A source image of any supported pixel kind.
#[derive(Debug, Clone)]
pub enum SourceImage {
    Bool(Image<bool>),
    U8(Image<u8>),
    I8(Image<i8>),
    U16(Image<u16>),
    I16(Image<i16>),
    U32(Image<u32>),
    I32(Image<i32>),
    F32(Image<f32>),
    F64(Image<f64>),
    Rgb(Image<Rgb>),
}

macro_rules! for_each_image {
    ($value:expr, $image:ident => $body:expr) => {
        match $value {
            SourceImage::Bool($image) => $body,
            SourceImage::U8($image) => $body,
            SourceImage::I8($image) => $body,
            SourceImage::U16($image) => $body,
            SourceImage::I16($image) => $body,
            SourceImage::U32($image) => $body,
            SourceImage::I32($image) => $body,
            SourceImage::F32($image) => $body,
            SourceImage::F64($image) => $body,
            SourceImage::Rgb($image) => $body,
        }
    };
}

impl SourceImage {
    pub fn kind(&self) -> PixelKind {
        for_each_image!(self, image => image.kind())
    }

    pub fn interval(&self) -> &Interval {
        for_each_image!(self, image => image.interval())
    }

    pub fn dimensions(&self) -> Vec<usize> {
        self.interval().dimensions()
    }

    pub fn num_dimensions(&self) -> usize {
        self.interval().num_dimensions()
    }
}

macro_rules! source_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Image<$ty>> for SourceImage {
                fn from(image: Image<$ty>) -> Self {
                    SourceImage::$variant(image)
                }
            }
        )*
    };
}

source_from!(
    bool => Bool,
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    f32 => F32,
    f64 => F64,
    Rgb => Rgb,
);
