mod metatile;
mod path;

pub use metatile::*;
pub use path::*;
