use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveValue::Set,
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::{render, Mailer};
use crate::config::NotificationConfig;
use crate::entities::{
    customer,
    notification_job::{self, dedupe_key},
    order, JobStatus, NotificationKind,
};
use crate::errors::ServiceError;

/// Records a notification job on `conn`, normally the caller's open
/// transaction. A second enqueue for the same `(kind, order)` is a no-op.
/// Returns whether a new job was written.
pub async fn enqueue<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    kind: NotificationKind,
) -> Result<bool, ServiceError> {
    let now = Utc::now();
    let job = notification_job::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        kind: Set(kind),
        dedupe_key: Set(dedupe_key(kind, order_id)),
        status: Set(JobStatus::Pending),
        attempts: Set(0),
        last_error: Set(None),
        available_at: Set(now),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let inserted = notification_job::Entity::insert(job)
        .on_conflict(
            OnConflict::column(notification_job::Column::DedupeKey)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(|e| {
            error!(order_id = %order_id, error = %e, "Failed to enqueue notification");
            ServiceError::DatabaseError(e)
        })?;

    if inserted == 0 {
        debug!(order_id = %order_id, kind = %kind, "Notification already queued");
        return Ok(false);
    }

    counter!("bloomhaven_notifications.enqueued", 1, "kind" => kind.to_string());
    Ok(true)
}

enum Outcome {
    Delivered,
    Retry(String),
    Permanent(String),
}

/// Polls the outbox and delivers due jobs through a [`Mailer`].
#[derive(Clone)]
pub struct NotificationWorker {
    db: Arc<DatabaseConnection>,
    mailer: Arc<dyn Mailer>,
    config: NotificationConfig,
}

impl NotificationWorker {
    pub fn new(
        db: Arc<DatabaseConnection>,
        mailer: Arc<dyn Mailer>,
        config: NotificationConfig,
    ) -> Self {
        Self { db, mailer, config }
    }

    /// Runs the poll loop on the tokio runtime until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        info!(
            max_retries = self.config.max_retries,
            backoff_secs = self.config.retry_backoff_secs,
            "Starting notification worker"
        );
        tokio::spawn(async move {
            let interval = Duration::from_millis(self.config.poll_interval_ms.max(50));
            loop {
                if let Err(e) = self.drain_once().await {
                    error!(error = %e, "notification worker error");
                }
                sleep(interval).await;
            }
        })
    }

    /// Processes one batch of due jobs and returns how many were claimed.
    ///
    /// Due jobs are `pending` rows whose `available_at` has passed, plus
    /// `processing` rows whose lease expired because a worker stopped between
    /// claim and settle.
    #[instrument(skip(self))]
    pub async fn drain_once(&self) -> Result<usize, ServiceError> {
        let now = Utc::now();
        let stale_before =
            now - ChronoDuration::seconds(self.config.processing_lease_secs as i64);

        let due = notification_job::Entity::find()
            .filter(
                Condition::any()
                    .add(
                        Condition::all()
                            .add(notification_job::Column::Status.eq(JobStatus::Pending))
                            .add(notification_job::Column::AvailableAt.lte(now)),
                    )
                    .add(
                        Condition::all()
                            .add(notification_job::Column::Status.eq(JobStatus::Processing))
                            .add(notification_job::Column::UpdatedAt.lt(stale_before)),
                    ),
            )
            .order_by_asc(notification_job::Column::CreatedAt)
            .limit(self.config.batch_size)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut claimed = 0;
        for job in due {
            if !self.claim(&job, stale_before).await? {
                continue;
            }
            claimed += 1;

            let attempts = job.attempts + 1;
            let outcome = if job.status == JobStatus::Processing
                && job.attempts > self.config.max_retries as i32
            {
                Outcome::Permanent("delivery attempts exhausted".to_string())
            } else {
                if job.status == JobStatus::Processing {
                    warn!(job_id = %job.id, attempts = job.attempts, "Reclaimed stale notification job");
                    counter!("bloomhaven_notifications.reclaimed", 1, "kind" => job.kind.to_string());
                }
                self.deliver(&job).await
            };

            // one job's bookkeeping failure must not stall the batch; the lease
            // brings the row back
            if let Err(e) = self.settle(&job, attempts, outcome).await {
                error!(job_id = %job.id, error = %e, "Failed to record notification outcome");
            }
        }

        Ok(claimed)
    }

    /// Moves `job` to `processing` unless another worker got there first.
    async fn claim(
        &self,
        job: &notification_job::Model,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut update = notification_job::Entity::update_many()
            .col_expr(
                notification_job::Column::Status,
                Expr::value(JobStatus::Processing),
            )
            .col_expr(
                notification_job::Column::Attempts,
                Expr::col(notification_job::Column::Attempts).add(1),
            )
            .col_expr(notification_job::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(notification_job::Column::Id.eq(job.id))
            .filter(notification_job::Column::Status.eq(job.status));
        if job.status == JobStatus::Processing {
            update = update.filter(notification_job::Column::UpdatedAt.lt(stale_before));
        }

        let result = update
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(result.rows_affected > 0)
    }

    async fn deliver(&self, job: &notification_job::Model) -> Outcome {
        let found = order::Entity::find_by_id(job.order_id)
            .find_also_related(customer::Entity)
            .one(&*self.db)
            .await;

        let (order, customer) = match found {
            Ok(Some((order, Some(customer)))) => (order, customer),
            Ok(_) => return Outcome::Permanent("order or customer missing".to_string()),
            Err(e) => return Outcome::Retry(e.to_string()),
        };

        let to = match customer.email.as_deref().filter(|e| !e.is_empty()) {
            Some(email) => email.to_string(),
            None => return Outcome::Permanent("customer has no email address".to_string()),
        };

        let message = render(job.kind, &order, &customer, &self.config.from_address, &to);
        match self.mailer.send(&message).await {
            Ok(()) => Outcome::Delivered,
            Err(e) => Outcome::Retry(e.to_string()),
        }
    }

    async fn settle(
        &self,
        job: &notification_job::Model,
        attempts: i32,
        outcome: Outcome,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        let mut update = notification_job::Entity::update_many()
            .col_expr(notification_job::Column::UpdatedAt, Expr::value(now))
            .filter(notification_job::Column::Id.eq(job.id));

        match outcome {
            Outcome::Delivered => {
                info!(job_id = %job.id, order_id = %job.order_id, kind = %job.kind, "Notification delivered");
                counter!("bloomhaven_notifications.delivered", 1, "kind" => job.kind.to_string());
                update = update
                    .col_expr(
                        notification_job::Column::Status,
                        Expr::value(JobStatus::Delivered),
                    )
                    .col_expr(
                        notification_job::Column::LastError,
                        Expr::value(Option::<String>::None),
                    );
            }
            Outcome::Retry(reason) if attempts <= self.config.max_retries as i32 => {
                let backoff = ChronoDuration::seconds(self.config.retry_backoff_secs as i64);
                warn!(job_id = %job.id, attempts, error = %reason, "Notification failed, retrying");
                update = update
                    .col_expr(
                        notification_job::Column::Status,
                        Expr::value(JobStatus::Pending),
                    )
                    .col_expr(
                        notification_job::Column::AvailableAt,
                        Expr::value(now + backoff),
                    )
                    .col_expr(notification_job::Column::LastError, Expr::value(reason));
            }
            Outcome::Retry(reason) | Outcome::Permanent(reason) => {
                error!(job_id = %job.id, order_id = %job.order_id, attempts, error = %reason, "Notification failed permanently");
                counter!("bloomhaven_notifications.failed", 1, "kind" => job.kind.to_string());
                update = update
                    .col_expr(
                        notification_job::Column::Status,
                        Expr::value(JobStatus::Failed),
                    )
                    .col_expr(notification_job::Column::LastError, Expr::value(reason));
            }
        }

        update
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(())
    }
}
