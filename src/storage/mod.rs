//! Page access layer: on-disk layout and the read-only snapshot the checker consumes

pub mod bucket;
pub mod checksum;
pub mod freelist;
pub mod meta;
pub mod page;
pub mod page_constants;
pub mod page_header;
pub mod page_io;
pub mod page_type;
pub mod tx;
