pub mod member;
pub mod offer;
pub mod redemption;
