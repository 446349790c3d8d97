pub mod reconciler;
pub mod subscription;

pub use reconciler::{Delivery, HistoricalRequest, LatestDatum, LatestValueReconciler, RequestToken};
pub use subscription::LatestValueSubscription;
