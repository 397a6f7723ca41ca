pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{CheckoutResponse, PaymentError, Settlement, SettlementOutcome};
pub use router::{
    appointment_payment_routes, prescription_payment_routes, retail_prescription_payment_routes,
};
pub use services::{CheckoutService, HttpPaymentGateway, PaymentGateway, PaymentLedger};
