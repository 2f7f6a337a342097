//! Content-defined chunking: the hash index (C1), window selector (C2),
//! matcher (C3), and hashtable persistence (C8).

pub mod index;
pub mod matcher;
pub mod persist;
pub mod window;

pub use index::{HashEntry, HashIndex, HashRow};
pub use matcher::{Match, Matcher};
