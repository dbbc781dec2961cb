mod common;
mod harvest_files_tests;
mod snapshot_tests;
