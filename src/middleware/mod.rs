pub mod paging;
pub mod role;
