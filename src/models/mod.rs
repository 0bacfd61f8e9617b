//! Data models for Libris

pub mod book;
pub mod borrow_record;
pub mod remote_book;
pub mod user;

// Re-export commonly used types
pub use book::{Availability, Book, BookInput, BookQuery, LibraryStats};
pub use borrow_record::{
    BorrowEvent, BorrowRecord, BorrowRecordDetails, BorrowStatus, NewBorrowRecord, RecordScope,
};
pub use remote_book::RemoteBook;
pub use user::{
    LoginRequest, LoginResponse, NewUser, ReaderInput, RegisterInput, Role, User, UserClaims, UserInfo,
};
