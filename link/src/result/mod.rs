//! Result consumption: chunk link checks, lazy paging and the row cursor.

mod chunks;
mod cursor;
mod pager;

pub use chunks::ChunkLinks;
pub use cursor::ResultCursor;
pub use pager::ResultPager;
