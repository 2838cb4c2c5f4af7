//! Monitor geometry helpers

use smithay::utils::{Logical, Physical, Size, Transform};

/// Logical size of a monitor with the given mode, scale and transform.
///
/// A 2560x1440 mode at scale 1.5 yields 1706.67x960; rotating by 90 degrees swaps w/h.
pub fn logical_size(
    mode: Size<i32, Physical>,
    scale: f64,
    transform: Transform,
) -> Size<f64, Logical> {
    transform.transform_size(mode.to_f64().to_logical(scale))
}

/// Convert integer to Smithay Transform.
/// 0=Normal, 1=90, 2=180, 3=270, 4=Flipped, 5=Flipped90, 6=Flipped180, 7=Flipped270.
pub fn int_to_transform(value: i32) -> Transform {
    match value {
        1 => Transform::_90,
        2 => Transform::_180,
        3 => Transform::_270,
        4 => Transform::Flipped,
        5 => Transform::Flipped90,
        6 => Transform::Flipped180,
        7 => Transform::Flipped270,
        _ => Transform::Normal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_size_rotated() {
        let size = logical_size((1920, 1080).into(), 2.0, Transform::_90);
        assert_eq!(size, Size::from((540.0, 960.0)));

        let size = logical_size((2560, 1440).into(), 1.0, Transform::Normal);
        assert_eq!(size, Size::from((2560.0, 1440.0)));
    }

    #[test]
    fn test_int_to_transform() {
        assert_eq!(int_to_transform(1), Transform::_90);
        assert_eq!(int_to_transform(7), Transform::Flipped270);
        assert_eq!(int_to_transform(42), Transform::Normal);
    }
}
