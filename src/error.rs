use thiserror::Error;

/// Errors surfaced by the recolor core.
///
/// Most bad input is recovered locally (clamped config, skipped reference
/// pairs, hashed seeds). What reaches the caller is either the image
/// boundary or a user edit the region state refuses.
#[derive(Error, Debug)]
pub enum Error {
    #[error("sprite has zero size: {width}x{height}")]
    EmptySprite { width: u32, height: u32 },

    #[error(
        "reference pair `{key}` has mismatched sizes: normal {}x{}, shiny {}x{}",
        .normal.0, .normal.1, .shiny.0, .shiny.1
    )]
    ReferenceSizeMismatch {
        key: String,
        normal: (u32, u32),
        shiny: (u32, u32),
    },

    #[error("no sprite loaded")]
    NoSprite,

    #[error("region {0} does not exist")]
    UnknownRegion(usize),

    #[error("region {0} is locked")]
    RegionLocked(usize),

    #[error("region {0} is kept unchanged")]
    RegionKept(usize),

    #[error("pixel ({x}, {y}) is outside the {width}x{height} sprite")]
    OutOfBounds { x: u32, y: u32, width: u32, height: u32 },

    #[error("pixel ({x}, {y}) does not belong to any region")]
    NoRegionAtPixel { x: u32, y: u32 },

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;
