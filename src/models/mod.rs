pub mod notificationmodel;
pub mod paymentmodel;
pub mod taskmodel;
pub mod usermodel;
