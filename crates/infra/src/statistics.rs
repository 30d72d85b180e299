//! Revenue statistics over placed orders.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, instrument};

use kiosk_core::{DateRange, DomainError};
use kiosk_sales::OrderStatus;

use crate::external::mail::{MailSendClient, MailService};
use crate::store::{MailHistoryStore, OrderStore, StoreError};

#[derive(Debug, Error)]
pub enum StatisticsError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Revenue of the range does not fit a `u64`.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The mail client did not accept the report; no history was recorded.
    #[error("failed to deliver sales statistics mail to {to}")]
    NotificationDelivery { to: String },
}

pub struct OrderStatisticsService<S, C, H> {
    orders: S,
    mail: MailService<C, H>,
    sender: String,
}

impl<S, C, H> OrderStatisticsService<S, C, H>
where
    S: OrderStore,
    C: MailSendClient,
    H: MailHistoryStore,
{
    pub fn new(orders: S, mail: MailService<C, H>, sender: impl Into<String>) -> Self {
        Self {
            orders,
            mail,
            sender: sender.into(),
        }
    }

    /// Sum of `total_price` over orders registered in `range` with `status`.
    pub async fn total_revenue(&self, range: DateRange, status: OrderStatus) -> Result<u64, StatisticsError> {
        let orders = self.orders.find_orders_by(range, status).await?;
        let total = orders
            .iter()
            .try_fold(0u64, |total, order| total.checked_add(order.total_price()))
            .ok_or_else(|| DomainError::invariant("revenue total overflows"))?;
        Ok(total)
    }

    /// Mails the paid revenue of `order_date` to `to_email` and returns it.
    #[instrument(skip(self), err)]
    pub async fn send_order_statistics_mail(
        &self,
        order_date: NaiveDate,
        to_email: &str,
    ) -> Result<u64, StatisticsError> {
        let total = self
            .total_revenue(DateRange::day(order_date), OrderStatus::PaymentCompleted)
            .await?;

        let subject = format!("[Sales statistics] {order_date}");
        let content = format!("Total revenue: {total}");
        let delivered = self
            .mail
            .send_mail(&self.sender, to_email, &subject, &content)
            .await?;
        if !delivered {
            return Err(StatisticsError::NotificationDelivery {
                to: to_email.to_string(),
            });
        }

        info!(total, status = OrderStatus::PaymentCompleted.label(), "sales statistics mailed");
        Ok(total)
    }

    pub fn mail(&self) -> &MailService<C, H> {
        &self.mail
    }
}
