pub mod cache_manager;
