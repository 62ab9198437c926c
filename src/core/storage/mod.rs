//! 存储往返测试：文件系统、闪存以及文件到闪存的流水线

pub mod file;
pub mod flash;
pub mod pipeline;

pub use file::{BlockWriter, FileStore};
pub use flash::{
    compare_filled, compare_pages, erase_after_reserved, fill_with_story, program_pages, FlashDevice, FlashError, RamFlash,
};
pub use pipeline::{file_to_flash, PipelineStats};
