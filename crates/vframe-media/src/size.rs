//! Output frame size computation.

use vframe_models::{ExtractionParams, ImageSize};

/// Output size for extracted frames, or `None` to keep the native size.
///
/// `size` wins over `min_size`/`max_size`. A `-1` dimension keeps the aspect
/// ratio; it stays `-1` when the input size is unknown. `min_size` scales up
/// and `max_size` scales down, both aspect preserving, with `max_size` taking
/// precedence when they conflict. Computed dimensions are even.
pub fn compute_output_size(input: Option<(u32, u32)>, params: &ExtractionParams) -> Option<ImageSize> {
    if let Some(size) = params.size {
        if size.width < 0 && size.height < 0 {
            return None;
        }
        let Some((w, h)) = input.filter(|(w, h)| *w > 0 && *h > 0) else {
            return Some(size);
        };
        let resolved = resolve_aspect(size, w, h);
        return (resolved != ImageSize::new(w as i32, h as i32)).then_some(resolved);
    }

    if params.min_size.is_none() && params.max_size.is_none() {
        return None;
    }
    let (w, h) = input.filter(|(w, h)| *w > 0 && *h > 0)?;

    let mut scale = 1.0f64;
    if let Some(min) = params.min_size {
        let up = [ratio(min.width, w), ratio(min.height, h)]
            .into_iter()
            .flatten()
            .fold(1.0f64, f64::max);
        scale = scale.max(up);
    }
    if let Some(max) = params.max_size {
        let down = [ratio(max.width, w), ratio(max.height, h)]
            .into_iter()
            .flatten()
            .fold(f64::INFINITY, f64::min);
        scale = scale.min(down);
    }

    if (scale - 1.0).abs() < 1e-9 {
        return None;
    }
    Some(ImageSize::new(even(w as f64 * scale), even(h as f64 * scale)))
}

/// FFmpeg `scale` filter for a size. `-1` becomes `-2` so FFmpeg keeps the
/// aspect ratio with an even dimension.
pub fn scale_filter(size: ImageSize) -> String {
    let dim = |d: i32| if d < 0 { -2 } else { d };
    format!("scale={}:{}", dim(size.width), dim(size.height))
}

fn resolve_aspect(size: ImageSize, w: u32, h: u32) -> ImageSize {
    let aspect = w as f64 / h as f64;
    match (size.width, size.height) {
        (width, height) if width < 0 => ImageSize::new(even(height as f64 * aspect), height),
        (width, height) if height < 0 => ImageSize::new(width, even(width as f64 / aspect)),
        (width, height) => ImageSize::new(width, height),
    }
}

fn ratio(target: i32, actual: u32) -> Option<f64> {
    (target > 0).then(|| target as f64 / actual as f64)
}

fn even(x: f64) -> i32 {
    (((x / 2.0).round() as i32) * 2).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(size: Option<ImageSize>, min: Option<ImageSize>, max: Option<ImageSize>) -> ExtractionParams {
        ExtractionParams {
            size,
            min_size: min,
            max_size: max,
            force: false,
        }
    }

    #[test]
    fn test_no_constraints_keeps_native() {
        assert_eq!(compute_output_size(Some((1920, 1080)), &params(None, None, None)), None);
    }

    #[test]
    fn test_size_with_aspect() {
        let p = params(Some(ImageSize::new(640, -1)), None, None);
        assert_eq!(compute_output_size(Some((1920, 1080)), &p), Some(ImageSize::new(640, 360)));

        let p = params(Some(ImageSize::new(-1, 720)), None, None);
        assert_eq!(compute_output_size(Some((1920, 1080)), &p), Some(ImageSize::new(1280, 720)));
    }

    #[test]
    fn test_size_unknown_input_is_passed_through() {
        let p = params(Some(ImageSize::new(640, -1)), None, None);
        assert_eq!(compute_output_size(None, &p), Some(ImageSize::new(640, -1)));
        assert_eq!(scale_filter(ImageSize::new(640, -1)), "scale=640:-2");
    }

    #[test]
    fn test_max_size_downscales() {
        let p = params(None, None, Some(ImageSize::new(960, -1)));
        assert_eq!(compute_output_size(Some((1920, 1080)), &p), Some(ImageSize::new(960, 540)));

        let p = params(None, None, Some(ImageSize::new(4000, 4000)));
        assert_eq!(compute_output_size(Some((1920, 1080)), &p), None);
    }

    #[test]
    fn test_min_size_upscales() {
        let p = params(None, Some(ImageSize::new(-1, 720)), None);
        assert_eq!(compute_output_size(Some((640, 360)), &p), Some(ImageSize::new(1280, 720)));
    }
}
