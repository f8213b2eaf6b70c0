pub mod codec;
pub mod heap;
pub mod reorg;
pub mod table;
pub mod vacuum;
