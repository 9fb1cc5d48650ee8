pub mod normalize;
pub mod util;

pub use normalize::{collect_pages, NormalizeError, NormalizeSummary, Normalizer};
pub use util::ensure_dirs;
