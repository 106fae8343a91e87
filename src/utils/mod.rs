pub mod export;
pub mod hash;
pub mod origin;
pub mod photo;
pub mod qr;
