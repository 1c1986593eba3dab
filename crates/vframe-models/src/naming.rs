//! Frame image naming.

/// Default zero-padded sequence index for frame images.
pub const DEFAULT_SEQUENCE_IDX: &str = "%06d";
/// Default frame image extension.
pub const DEFAULT_IMAGE_EXT: &str = ".jpg";
/// Default frame image naming pattern.
pub const DEFAULT_FRAMES_PATTERN: &str = "%06d.jpg";

/// Substitute a frame number into a printf-style pattern.
///
/// Supports `%d`, `%Nd` and `%0Nd`, plus `%%` for a literal percent sign.
/// Only the first integer directive is substituted.
pub fn format_frame_pattern(pattern: &str, frame_number: u32) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();
    let mut substituted = false;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut spec = String::new();
        while let Some(&d) = chars.peek() {
            if d.is_ascii_digit() {
                spec.push(d);
                chars.next();
            } else {
                break;
            }
        }

        if chars.peek() == Some(&'d') && !substituted {
            chars.next();
            substituted = true;
            let zero_pad = spec.starts_with('0');
            let width: usize = spec.parse().unwrap_or(0);
            if zero_pad {
                out.push_str(&format!("{:0width$}", frame_number, width = width));
            } else {
                out.push_str(&format!("{:width$}", frame_number, width = width));
            }
        } else {
            out.push('%');
            out.push_str(&spec);
        }
    }

    out
}

/// True if `pattern` has an integer directive, so distinct frames get
/// distinct names.
pub fn has_frame_directive(pattern: &str) -> bool {
    format_frame_pattern(pattern, 1) != format_frame_pattern(pattern, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_padded() {
        assert_eq!(format_frame_pattern(DEFAULT_FRAMES_PATTERN, 7), "000007.jpg");
        assert_eq!(format_frame_pattern("/out/%04d.png", 12345), "/out/12345.png");
    }

    #[test]
    fn test_plain_and_literal_percent() {
        assert_eq!(format_frame_pattern("frame-%d.jpg", 3), "frame-3.jpg");
        assert_eq!(format_frame_pattern("100%%-%03d.jpg", 3), "100%-003.jpg");
    }

    #[test]
    fn test_frame_directive_detection() {
        assert!(has_frame_directive(DEFAULT_FRAMES_PATTERN));
        assert!(has_frame_directive("frame-%d.png"));
        assert!(!has_frame_directive("frame.jpg"));
        assert!(!has_frame_directive("100%%.jpg"));
        assert!(!has_frame_directive("%s.jpg"));
    }

    #[test]
    fn test_default_pattern_is_idx_plus_ext() {
        assert_eq!(
            format!("{}{}", DEFAULT_SEQUENCE_IDX, DEFAULT_IMAGE_EXT),
            DEFAULT_FRAMES_PATTERN
        );
    }
}
