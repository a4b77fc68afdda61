pub mod document;
pub mod otp;
pub mod payment;
pub mod signature;
pub mod testimonial;
