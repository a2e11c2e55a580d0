pub mod image;

pub use self::image::{check_content_type, ImageNormalizer, NormalizedImage, DEFAULT_CONTENT_TYPE};
