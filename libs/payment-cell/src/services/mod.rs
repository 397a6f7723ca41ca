pub mod checkout;
pub mod gateway;
pub mod ledger;

pub use checkout::{CheckoutService, Payable};
pub use gateway::{parse_callback, HttpPaymentGateway, PaymentGateway};
pub use ledger::PaymentLedger;
