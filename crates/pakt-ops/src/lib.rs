pub mod ops_install;
pub mod ops_installer;
pub mod ops_resolve;
pub mod ops_tree;
pub mod project;
