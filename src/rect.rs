use nalgebra::Matrix1x4;
use num::Float;
use std::fmt::Debug;

/* ------------------------------------------------------------------------------
 * Type aliases
 * ------------------------------------------------------------------------------ */
/// (center x, center y, aspect = width / height, height)
pub type Xyah<T> = Matrix1x4<T>;

/* ------------------------------------------------------------------------------
 * Rect struct
 * ------------------------------------------------------------------------------ */
/// Axis-aligned box stored as (left, top, width, height).
#[derive(Debug, Clone, PartialEq)]
pub struct Rect<T>
where
    T: Debug + Float,
{
    tlwh: Matrix1x4<T>,
}

impl<T> Rect<T>
where
    T: Debug + Float,
{
    pub fn new(x: T, y: T, width: T, height: T) -> Self {
        Self {
            tlwh: Matrix1x4::new(x, y, width, height),
        }
    }

    /// Inverse of [`Rect::get_xyah`].
    pub fn from_xyah(xyah: &Xyah<T>) -> Self {
        let two = T::one() + T::one();
        let height = xyah[(0, 3)];
        let width = height * xyah[(0, 2)];
        Self::new(
            xyah[(0, 0)] - width / two,
            xyah[(0, 1)] - height / two,
            width,
            height,
        )
    }

    #[inline(always)]
    pub fn x(&self) -> T {
        self.tlwh[(0, 0)]
    }

    #[inline(always)]
    pub fn y(&self) -> T {
        self.tlwh[(0, 1)]
    }

    #[inline(always)]
    pub fn width(&self) -> T {
        self.tlwh[(0, 2)]
    }

    #[inline(always)]
    pub fn height(&self) -> T {
        self.tlwh[(0, 3)]
    }

    #[inline(always)]
    pub fn right(&self) -> T {
        self.x() + self.width()
    }

    #[inline(always)]
    pub fn bottom(&self) -> T {
        self.y() + self.height()
    }

    pub fn area(&self) -> T {
        self.width() * self.height()
    }

    /// Area counted in whole pixels, edges included on both sides.
    fn inclusive_area(&self) -> T {
        (self.width() + T::one()) * (self.height() + T::one())
    }

    /// Intersection over union with the +1 pixel edge convention. Boxes that
    /// do not overlap give exactly zero.
    pub fn calc_iou(&self, other: &Rect<T>) -> T {
        let iw = self.right().min(other.right()) - self.x().max(other.x())
            + T::one();
        if iw <= T::zero() {
            return T::zero();
        }

        let ih = self.bottom().min(other.bottom()) - self.y().max(other.y())
            + T::one();
        if ih <= T::zero() {
            return T::zero();
        }

        let intersection = iw * ih;
        let union =
            self.inclusive_area() + other.inclusive_area() - intersection;
        intersection / union
    }

    pub fn get_xyah(&self) -> Xyah<T> {
        let two = T::one() + T::one();
        Matrix1x4::new(
            self.x() + self.width() / two,
            self.y() + self.height() / two,
            self.width() / self.height(),
            self.height(),
        )
    }

    pub fn is_finite(&self) -> bool {
        self.tlwh.iter().all(|v| v.is_finite())
    }
}
