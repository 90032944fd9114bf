pub mod machine;
pub mod select;
