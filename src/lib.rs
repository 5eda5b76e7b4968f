//! memecast: fetch memes and posts, store each one once, and fan them out to
//! every channel subscribed to their category.

pub mod config;
pub mod delivery;
pub mod ingest;
pub mod markup;
pub mod storage;
pub mod transport;
pub mod util;
