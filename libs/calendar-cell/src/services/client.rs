use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::HeaderMap, header::HeaderValue, Client, Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::AppConfig;

use crate::models::{AppointmentRef, CalendarError, ContactRef, NewAppointment, RawSlot};

/// Stable seam over the external calendar system. Production traffic
/// goes through `CalendarClient`; tests substitute fakes.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn find_or_create_contact(
        &self,
        email: &str,
        name: &str,
        phone: Option<&str>,
    ) -> Result<ContactRef, CalendarError>;

    async fn get_free_slots(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawSlot>, CalendarError>;

    async fn create_appointment(
        &self,
        calendar_id: &str,
        contact: &ContactRef,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        details: &NewAppointment,
    ) -> Result<AppointmentRef, CalendarError>;
}

pub struct CalendarClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl CalendarClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.calendar_api_base_url.clone(),
            api_key: config.calendar_api_key.clone(),
            timeout_secs: config.calendar_timeout_secs,
        }
    }

    fn headers(&self) -> Result<HeaderMap, CalendarError> {
        if self.api_key.is_empty() {
            return Err(CalendarError::Unconfigured(
                "calendar API key is not set".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| CalendarError::Unconfigured("calendar API key is not ASCII".to_string()))?;
        headers.insert(reqwest::header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Every provider call runs under an explicit deadline; a hung
    /// provider must never stall a booking request indefinitely.
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, CalendarError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Calendar API request: {} {}", method, url);

        let headers = self.headers()?;
        let mut request = self.client.request(method, &url).headers(headers);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = tokio::time::timeout(Duration::from_secs(self.timeout_secs), request.send())
            .await
            .map_err(|_| CalendarError::Timeout(self.timeout_secs))?
            .map_err(|e| CalendarError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!("Calendar API error ({}): {}", status, detail);
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => CalendarError::RateLimited,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    CalendarError::PermissionDenied(detail)
                }
                StatusCode::NOT_FOUND => CalendarError::NotFound(detail),
                s if s.is_server_error() => CalendarError::Transport(format!(
                    "provider returned {}: {}",
                    s, detail
                )),
                _ => CalendarError::MalformedResponse(format!(
                    "unexpected status {}: {}",
                    status, detail
                )),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| CalendarError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl CalendarProvider for CalendarClient {
    async fn find_or_create_contact(
        &self,
        email: &str,
        name: &str,
        phone: Option<&str>,
    ) -> Result<ContactRef, CalendarError> {
        let search_path = format!("/contacts/search?query={}", urlencoding::encode(email));
        let found = self.call(Method::GET, &search_path, None).await;

        match found {
            Ok(body) => {
                let contacts = body["contacts"].as_array().cloned().unwrap_or_default();
                if let Some(existing) = contacts
                    .iter()
                    .find(|contact| contact["email"].as_str() == Some(email))
                {
                    let id = existing["id"]
                        .as_str()
                        .ok_or_else(|| {
                            CalendarError::MalformedResponse(
                                "contact record without id".to_string(),
                            )
                        })?
                        .to_string();
                    debug!("Found existing calendar contact {}", id);
                    return Ok(ContactRef { id });
                }
            }
            // A missing contact is a normal outcome, not a failure.
            Err(CalendarError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let mut name_parts = name.split_whitespace();
        let first_name = name_parts.next().unwrap_or("");
        let last_name = name_parts.collect::<Vec<_>>().join(" ");

        let created = self
            .call(
                Method::POST,
                "/contacts/",
                Some(json!({
                    "firstName": first_name,
                    "lastName": if last_name.is_empty() { "-".to_string() } else { last_name },
                    "email": email,
                    "phone": phone,
                    "source": "Website Booking",
                })),
            )
            .await?;

        let id = created["contact"]["id"]
            .as_str()
            .or_else(|| created["id"].as_str())
            .ok_or_else(|| {
                CalendarError::MalformedResponse("created contact without id".to_string())
            })?
            .to_string();

        debug!("Created calendar contact {}", id);
        Ok(ContactRef { id })
    }

    async fn get_free_slots(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawSlot>, CalendarError> {
        let path = format!(
            "/calendars/{}/free-slots?startDate={}&endDate={}",
            calendar_id,
            urlencoding::encode(&start.to_rfc3339()),
            urlencoding::encode(&end.to_rfc3339()),
        );

        let body = self.call(Method::GET, &path, None).await?;

        let raw_slots = body["slots"].as_array().ok_or_else(|| {
            CalendarError::MalformedResponse("free-slots response missing slots array".to_string())
        })?;

        let mut slots = Vec::with_capacity(raw_slots.len());
        for raw in raw_slots {
            let start_time = parse_provider_time(&raw["startTime"])?;
            let end_time = parse_provider_time(&raw["endTime"])?;
            slots.push(RawSlot { start_time, end_time });
        }

        debug!(
            "Calendar {} reported {} free slots between {} and {}",
            calendar_id,
            slots.len(),
            start,
            end
        );
        Ok(slots)
    }

    async fn create_appointment(
        &self,
        calendar_id: &str,
        contact: &ContactRef,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        details: &NewAppointment,
    ) -> Result<AppointmentRef, CalendarError> {
        let body = self
            .call(
                Method::POST,
                "/calendars/events/appointments",
                Some(json!({
                    "calendarId": calendar_id,
                    "contactId": contact.id,
                    "title": details.title,
                    "startTime": start.to_rfc3339(),
                    "endTime": end.to_rfc3339(),
                    "appointmentStatus": "confirmed",
                    "address": details.address.as_deref().unwrap_or("Remote/Online Service"),
                    "toNotify": details.notify,
                })),
            )
            .await?;

        let id = body["event"]["id"]
            .as_str()
            .or_else(|| body["id"].as_str())
            .ok_or_else(|| {
                CalendarError::MalformedResponse("created appointment without id".to_string())
            })?
            .to_string();

        Ok(AppointmentRef { id })
    }
}

fn parse_provider_time(value: &Value) -> Result<DateTime<Utc>, CalendarError> {
    let raw = value.as_str().ok_or_else(|| {
        CalendarError::MalformedResponse("slot timestamp is not a string".to_string())
    })?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CalendarError::MalformedResponse(format!("bad slot timestamp {}: {}", raw, e)))
}
