//! 公共工具：流水号、签名、时间格式和任务防护。

pub mod seq_no;
pub mod sign;
pub mod task;
pub mod timefmt;

pub use seq_no::{SeqNoGenerator, SeqNoSource};
pub use task::spawn_guarded;
