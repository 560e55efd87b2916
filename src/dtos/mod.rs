pub mod paymentdtos;
pub mod taskdtos;
