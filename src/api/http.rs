use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::model::*;

use super::{decode_failure, ApiError, AppointmentApi, RescheduleBody};

/// REST client for the appointment store.
pub struct HttpAppointmentApi {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

/// Listings come back either bare or wrapped, depending on the endpoint version.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing {
    Bare(Vec<BookedAppointment>),
    Wrapped { appointments: Vec<BookedAppointment> },
}

impl Listing {
    fn into_vec(self) -> Vec<BookedAppointment> {
        match self {
            Listing::Bare(v) | Listing::Wrapped { appointments: v } => v,
        }
    }
}

impl HttpAppointmentApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn transport(&self, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else {
            ApiError::Transport(e.to_string())
        }
    }

    async fn send(
        &self,
        call: &'static str,
        req: reqwest::RequestBuilder,
    ) -> Result<String, ApiError> {
        let started = Instant::now();
        let result = self.authorize(req).send().await;
        metrics::histogram!(crate::observability::API_CALL_DURATION_SECONDS, "call" => call)
            .record(started.elapsed().as_secs_f64());

        let resp = result.map_err(|e| self.transport(e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.transport(e))?;
        debug!(call, status = status.as_u16(), "appointment store responded");

        if status.is_success() {
            Ok(body)
        } else {
            Err(decode_failure(status.as_u16(), &body))
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        call: &'static str,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let body = self.send(call, req).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(format!("{call}: {e}")))
    }
}

#[async_trait]
impl AppointmentApi for HttpAppointmentApi {
    /// GET /businesses/:id/hours
    async fn working_hours(&self, business: &BusinessId) -> Result<WorkingHours, ApiError> {
        let url = self.endpoint(&format!("businesses/{business}/hours"));
        self.send_json("working_hours", self.http.get(url)).await
    }

    /// GET /businesses/:id/appointments?date=YYYY-MM-DD
    async fn booked_slots(
        &self,
        business: &BusinessId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<BookedAppointment>, ApiError> {
        let url = self.endpoint(&format!("businesses/{business}/appointments"));
        let mut req = self.http.get(url);
        if let Some(date) = date {
            req = req.query(&[("date", date.to_string())]);
        }
        let listing: Listing = self.send_json("booked_slots", req).await?;
        Ok(listing.into_vec())
    }

    /// POST /appointments
    async fn create_appointment(&self, request: &BookingRequest) -> Result<Appointment, ApiError> {
        let url = self.endpoint("appointments");
        self.send_json("create_appointment", self.http.post(url).json(request))
            .await
    }

    /// PUT /appointments/:id/reschedule
    async fn reschedule_appointment(
        &self,
        id: &AppointmentId,
        date: NaiveDate,
        time: TimeOfDay,
        duration_minutes: Minutes,
    ) -> Result<Appointment, ApiError> {
        let url = self.endpoint(&format!("appointments/{id}/reschedule"));
        let body = RescheduleBody {
            date,
            time,
            duration_minutes,
        };
        self.send_json("reschedule_appointment", self.http.put(url).json(&body))
            .await
    }

    /// PUT /appointments/:id/cancel
    async fn cancel_appointment(&self, id: &AppointmentId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("appointments/{id}/cancel"));
        self.send("cancel_appointment", self.http.put(url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpAppointmentApi {
        HttpAppointmentApi::new(base, None, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            api("http://localhost:3000/api/").endpoint("/appointments"),
            "http://localhost:3000/api/appointments"
        );
        assert_eq!(
            api("http://localhost:3000/api").endpoint("businesses/b1/hours"),
            "http://localhost:3000/api/businesses/b1/hours"
        );
    }

    #[test]
    fn listing_accepts_both_shapes() {
        let bare = r#"[{"date":"2026-10-19","time":"10:00","durationMinutes":60}]"#;
        let wrapped =
            r#"{"appointments":[{"date":"2026-10-19","time":"10:00","durationMinutes":60}]}"#;
        let a: Listing = serde_json::from_str(bare).unwrap();
        let b: Listing = serde_json::from_str(wrapped).unwrap();
        assert_eq!(a.into_vec(), b.into_vec());
    }

    #[tokio::test]
    async fn unreachable_store_is_transport_error() {
        // Port 9 (discard) on localhost is closed on any sane test host.
        let api = api("http://127.0.0.1:9");
        let err = api.working_hours(&"b1".into()).await.unwrap_err();
        assert!(err.is_retryable(), "{err:?}");
    }
}
