mod invoking_user;

pub use invoking_user::*;
