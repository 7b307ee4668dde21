pub mod assignment;
pub mod attempt_counter;
pub mod notification;
pub mod question;
