use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
        }
    }

    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn contains(&self, other: &Size) -> bool {
        self.width >= other.width && self.height >= other.height
    }
}

impl Display for Size {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A range of frame sizes a device can produce for one media-bus code.
///
/// Discrete sizes are represented as ranges with `min == max`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SizeRange {
    pub min: Size,
    pub max: Size,
}

impl SizeRange {
    pub const fn new(min: Size, max: Size) -> Self {
        Self {
            min,
            max,
        }
    }

    pub const fn fixed(size: Size) -> Self {
        Self {
            min: size,
            max: size,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Display for Rectangle {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "({},{})/{}x{}", self.x, self.y, self.width, self.height)
    }
}
