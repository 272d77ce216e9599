//! Frame type and pixel conversion: YUYV / GREY / Y16 to packed RGB.

/// A captured camera frame as packed RGB8.
#[derive(Clone)]
pub struct Frame {
    /// RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Average pixel brightness (0.0–255.0) over all channels.
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

fn check_len(buf: &[u8], expected: usize) -> Result<(), FrameError> {
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// BT.601 limited-range YUV to RGB, integer arithmetic.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
    ]
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    check_len(yuyv, expected)?;

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

/// Replicate 8-bit grayscale into three channels.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    check_len(grey, pixels)?;
    Ok(grey[..pixels].iter().flat_map(|&p| [p, p, p]).collect())
}

/// 16-bit little-endian grayscale, downscaled to 8 bits and replicated.
pub fn y16_to_rgb(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    check_len(buf, pixels * 2)?;
    Ok(buf[..pixels * 2]
        .chunks_exact(2)
        .flat_map(|px| {
            let value = u16::from_le_bytes([px[0], px[1]]);
            let p = (value >> 8) as u8;
            [p, p, p]
        })
        .collect())
}

/// True if more than `threshold_pct` of the bytes are below 32.
pub fn is_dark_frame(data: &[u8], threshold_pct: f32) -> bool {
    if data.is_empty() {
        return true;
    }
    let dark_count = data.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / data.len() as f32) > threshold_pct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_white_and_black() {
        // 2x1 image: Y0=235 (white), Y1=16 (black), neutral chroma
        let yuyv = vec![235, 128, 16, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![255, 255, 255, 0, 0, 0]);
    }

    #[test]
    fn test_yuyv_red_dominant() {
        // High V pushes red up and green down
        let rgb = yuyv_to_rgb(&[82, 90, 82, 240], 2, 1).unwrap();
        assert!(rgb[0] > 200, "red = {}", rgb[0]);
        assert!(rgb[1] < 50, "green = {}", rgb[1]);
        assert_eq!(&rgb[..3], &rgb[3..]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_rgb(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_grey_to_rgb() {
        let rgb = grey_to_rgb(&[10, 200], 2, 1).unwrap();
        assert_eq!(rgb, vec![10, 10, 10, 200, 200, 200]);
    }

    #[test]
    fn test_y16_to_rgb_takes_high_byte() {
        // 0x1234 little-endian → high byte 0x12
        let rgb = y16_to_rgb(&[0x34, 0x12], 1, 1).unwrap();
        assert_eq!(rgb, vec![0x12, 0x12, 0x12]);
    }

    #[test]
    fn test_y16_invalid_length() {
        assert!(y16_to_rgb(&[0x34], 1, 1).is_err());
    }

    #[test]
    fn test_dark_frame_all_black() {
        assert!(is_dark_frame(&[0u8; 1000], 0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        assert!(!is_dark_frame(&[128u8; 1000], 0.95));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&[], 0.95));
    }

    #[test]
    fn test_dark_frame_borderline_bright() {
        // 94% dark, 6% bright → not dark
        let mut data = vec![10u8; 940];
        data.extend(vec![128u8; 60]);
        assert!(!is_dark_frame(&data, 0.95));
    }

    #[test]
    fn test_avg_brightness() {
        let frame = Frame {
            data: vec![0, 100, 200],
            width: 1,
            height: 1,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        };
        assert!((frame.avg_brightness() - 100.0).abs() < 1e-6);
    }
}
