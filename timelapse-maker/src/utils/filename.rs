//! Image filename convention shared by acquisition and frame sequencing.

use chrono::NaiveDateTime;

/// Timestamp layout embedded in acquired image filenames, second
/// precision. Two acquisitions within one second target the same name and
/// the later one overwrites.
pub const IMAGE_TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H_%M_%S";

/// File name for an image captured at `t`.
pub fn image_file_name(t: NaiveDateTime) -> String {
    format!("{}.jpg", t.format(IMAGE_TIMESTAMP_FORMAT))
}

/// Recover the capture timestamp encoded in an image file name.
pub fn parse_image_timestamp(name: &str) -> Option<NaiveDateTime> {
    let stem = name.strip_suffix(".jpg")?;
    NaiveDateTime::parse_from_str(stem, IMAGE_TIMESTAMP_FORMAT).ok()
}
