use serde::Deserialize;

use crate::types::{CustomerId, PaymentDetails};

/// A payment event to notify a customer about.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub customer_id: CustomerId,
    pub details: PaymentDetails,
}
