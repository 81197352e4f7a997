/// Minimal structural check of an ESP application image header.
///
/// This is not signature verification; it only rejects uploads that
/// cannot possibly be a firmware image before any flash write happens.

/// First byte of every ESP application image.
pub const IMAGE_MAGIC: u8 = 0xE9;

/// Header prefix length needed for the check: magic, segment count,
/// flash mode, flash size/speed, 32-bit entry address.
pub const HEADER_PREFIX_LEN: usize = 8;

const MAX_SEGMENTS: u8 = 16;
const MAX_FLASH_MODE: u8 = 5;

// Entry points live in the CPU address space mapped from flash/IRAM.
const ENTRY_ADDR_MIN: u32 = 0x4000_0000;
const ENTRY_ADDR_MAX: u32 = 0x5000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub segment_count: u8,
    pub flash_mode: u8,
    pub entry_addr: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    TooShort,
    BadMagic(u8),
    BadSegmentCount(u8),
    BadFlashMode(u8),
    BadEntryAddr(u32),
}

impl std::fmt::Display for ImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageError::TooShort => write!(f, "image header truncated"),
            ImageError::BadMagic(b) => write!(f, "bad image magic 0x{:02X}", b),
            ImageError::BadSegmentCount(n) => write!(f, "implausible segment count {}", n),
            ImageError::BadFlashMode(m) => write!(f, "implausible flash mode 0x{:02X}", m),
            ImageError::BadEntryAddr(a) => write!(f, "degenerate entry address 0x{:08X}", a),
        }
    }
}

impl std::error::Error for ImageError {}

/// Validate the first bytes of a raw upload against the image header
/// layout. Fails rather than guessing when the bytes do not look like
/// firmware.
pub fn check_image_header(data: &[u8]) -> Result<ImageHeader, ImageError> {
    if data.len() < HEADER_PREFIX_LEN {
        return Err(ImageError::TooShort);
    }
    if data[0] != IMAGE_MAGIC {
        return Err(ImageError::BadMagic(data[0]));
    }
    let segment_count = data[1];
    if segment_count == 0 || segment_count > MAX_SEGMENTS {
        return Err(ImageError::BadSegmentCount(segment_count));
    }
    let flash_mode = data[2];
    if flash_mode > MAX_FLASH_MODE {
        return Err(ImageError::BadFlashMode(flash_mode));
    }
    let entry_addr = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if !(ENTRY_ADDR_MIN..ENTRY_ADDR_MAX).contains(&entry_addr) {
        return Err(ImageError::BadEntryAddr(entry_addr));
    }
    Ok(ImageHeader {
        segment_count,
        flash_mode,
        entry_addr,
    })
}
