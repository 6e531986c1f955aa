mod flat;
mod store;

pub use flat::{FlatIpIndex, Neighbor};
pub use store::{BuildReport, IndexMeta, IndexStore, RetrievalHit};
