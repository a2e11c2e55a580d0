pub mod table;

pub use table::ClassLabelTable;
