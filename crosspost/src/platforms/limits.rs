//! Static per-platform posting constraints.
//!
//! Adapters consult these before publishing; the values mirror each
//! platform's documented caption and media rules.

use crate::credentials::Provider;
use crate::media::MediaType;

/// Posting constraints for one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformLimits {
    pub max_characters: usize,
    pub max_hashtags: usize,
    pub recommended_hashtags: usize,
    pub supported_media: &'static [MediaType],
}

const INSTAGRAM: PlatformLimits = PlatformLimits {
    max_characters: 2200,
    max_hashtags: 30,
    recommended_hashtags: 20,
    supported_media: &[MediaType::Image, MediaType::Video],
};

const TIKTOK: PlatformLimits = PlatformLimits {
    max_characters: 150,
    max_hashtags: 30,
    recommended_hashtags: 20,
    supported_media: &[MediaType::Video],
};

const YOUTUBE: PlatformLimits = PlatformLimits {
    max_characters: 5000,
    max_hashtags: 15,
    recommended_hashtags: 10,
    supported_media: &[MediaType::Video],
};

const LINKEDIN: PlatformLimits = PlatformLimits {
    max_characters: 3000,
    max_hashtags: 15,
    recommended_hashtags: 10,
    supported_media: &[MediaType::Image, MediaType::Video, MediaType::Document],
};

/// Constraints for a platform.
pub fn limits_for(provider: Provider) -> &'static PlatformLimits {
    match provider {
        Provider::Instagram => &INSTAGRAM,
        Provider::Tiktok => &TIKTOK,
        Provider::Youtube => &YOUTUBE,
        Provider::Linkedin => &LINKEDIN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_lookup() {
        assert_eq!(limits_for(Provider::Tiktok).max_characters, 150);
        assert!(
            limits_for(Provider::Linkedin)
                .supported_media
                .contains(&MediaType::Document)
        );
    }
}
