//! Mapping from source file names to group labels and image identifiers.
//!
//! Fiji exports encode the experimental condition in the file name. The
//! default convention ([`FilenamePrefix`]) takes the first character as the
//! group and the first two `_`-separated tokens as the image. Other lab
//! conventions plug in through [`RecordNaming`] without touching the
//! statistics.

/// Derives group and image identity from a file name.
pub trait RecordNaming: Send + Sync {
    /// Group label for a file, or `None` if the name carries no group.
    fn group(&self, file: &str) -> Option<String>;

    /// Identifier shared by every series of the same physical image.
    fn image_id(&self, file: &str) -> String;
}

/// First character is the group; `<tok0>_<tok1>` is the image.
///
/// ```
/// use image_quant::preprocess::{FilenamePrefix, RecordNaming};
///
/// let naming = FilenamePrefix;
/// assert_eq!(naming.group("B_cell03_s2.tif").as_deref(), Some("B"));
/// assert_eq!(naming.image_id("B_cell03_s2.tif"), "B_cell03");
/// assert_eq!(naming.image_id("Bcell03.tif"), "Bcell03.tif");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FilenamePrefix;

impl RecordNaming for FilenamePrefix {
    fn group(&self, file: &str) -> Option<String> {
        file.trim()
            .chars()
            .next()
            .filter(|c| !c.is_whitespace())
            .map(String::from)
    }

    fn image_id(&self, file: &str) -> String {
        let file = file.trim();
        let mut parts = file.splitn(3, '_');
        match (parts.next(), parts.next()) {
            (Some(first), Some(second)) => format!("{first}_{second}"),
            _ => file.to_string(),
        }
    }
}

/// Naming built from two closures.
pub struct FnNaming<G, I> {
    group: G,
    image: I,
}

impl<G, I> FnNaming<G, I>
where
    G: Fn(&str) -> Option<String> + Send + Sync,
    I: Fn(&str) -> String + Send + Sync,
{
    /// Create a naming from a group extractor and an image extractor.
    pub fn new(group: G, image: I) -> Self {
        Self { group, image }
    }
}

impl<G, I> RecordNaming for FnNaming<G, I>
where
    G: Fn(&str) -> Option<String> + Send + Sync,
    I: Fn(&str) -> String + Send + Sync,
{
    fn group(&self, file: &str) -> Option<String> {
        (self.group)(file)
    }

    fn image_id(&self, file: &str) -> String {
        (self.image)(file)
    }
}
