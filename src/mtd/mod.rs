pub mod block;

pub use block::{MtdBlockLayer, FIRST_GENERAL_SECTOR, FORMAT_SECTOR, ROOT_DIR_SECTOR};
