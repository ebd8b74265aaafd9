use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use url::Url;

use crate::config::MeetupConfig;

pub mod error;
pub mod types;

pub use self::error::{MeetupError, Result};
pub use self::types::{Event, EventStatus, Venue, Visibility};

/// Page size used when resolving the next event: only the first slot is
/// ever considered.
pub const NEXT_EVENT_PAGE_SIZE: u32 = 1;

/// Read access to the external events directory.
#[async_trait]
pub trait EventDirectory: Send + Sync {
    /// `Ok(false)` when the directory reports the group as unknown.
    async fn group_exists(&self, group: &str) -> Result<bool>;

    async fn list_events(&self, group: &str, page_size: u32) -> Result<Vec<Event>>;

    /// The listing body exactly as the directory returned it.
    async fn fetch_events_raw(&self, group: &str, page_size: u32) -> Result<String>;

    async fn resolve_next(&self, group: &str) -> Result<Option<Event>> {
        let events = self.list_events(group, NEXT_EVENT_PAGE_SIZE).await?;
        Ok(select_next_event(events))
    }
}

/// Picks the first listed event if it is upcoming and public. Later entries
/// are never considered, even when the first one does not qualify.
pub fn select_next_event(events: Vec<Event>) -> Option<Event> {
    events.into_iter().next().filter(Event::is_announceable)
}

/// Decodes an events listing. Failures name the offending JSON path, e.g.
/// `$[0].time`.
pub fn decode_events(body: &str) -> Result<Vec<Event>> {
    let mut deserializer = serde_json::Deserializer::from_str(body);
    let events: Vec<Event> =
        serde_path_to_error::deserialize(&mut deserializer).map_err(|e| MeetupError::Decode {
            path: json_path(e.path()),
            message: e.inner().to_string(),
        })?;
    deserializer.end().map_err(|e| MeetupError::Decode {
        path: "$".to_string(),
        message: e.to_string(),
    })?;
    Ok(events)
}

fn json_path(path: &serde_path_to_error::Path) -> String {
    if path.iter().next().is_none() {
        "$".to_string()
    } else {
        format!("${path}")
    }
}

pub struct MeetupClient {
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl MeetupClient {
    pub fn new(config: &MeetupConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| MeetupError::InvalidBaseUrl(format!("{}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(MeetupError::InvalidBaseUrl(config.base_url.clone()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: SecretString::from(config.api_key.clone()),
        })
    }

    /// Builds `<base>/<group>[/events]?key=..[&page=..]`. The group name is
    /// always a single, percent-encoded path segment.
    fn group_url(&self, group: &str, events: bool, page_size: Option<u32>) -> Result<Url> {
        if group.trim().is_empty() {
            return Err(MeetupError::InvalidGroup(group.to_string()));
        }

        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| MeetupError::InvalidBaseUrl(self.base_url.to_string()))?;
            segments.pop_if_empty().push(group);
            if events {
                segments.push("events");
            }
        }

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("key", self.api_key.expose_secret());
            if let Some(page_size) = page_size {
                query.append_pair("page", &page_size.to_string());
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl EventDirectory for MeetupClient {
    async fn group_exists(&self, group: &str) -> Result<bool> {
        let url = self.group_url(group, false, None)?;
        let resp = self.client.get(url).send().await?;

        let status = resp.status();
        debug!("meetup group lookup group={} status={}", group, status);

        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MeetupError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(true)
    }

    async fn list_events(&self, group: &str, page_size: u32) -> Result<Vec<Event>> {
        let body = self.fetch_events_raw(group, page_size).await?;
        let events = decode_events(&body)?;
        debug!(
            "meetup events decoded group={} page_size={} count={}",
            group,
            page_size,
            events.len()
        );
        Ok(events)
    }

    async fn fetch_events_raw(&self, group: &str, page_size: u32) -> Result<String> {
        let url = self.group_url(group, true, Some(page_size))?;
        let resp = self.client.get(url).send().await?;

        let status = resp.status();
        debug!(
            "meetup events fetch group={} page_size={} status={}",
            group, page_size, status
        );

        if status == StatusCode::NOT_FOUND {
            return Err(MeetupError::GroupNotFound {
                group: group.to_string(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MeetupError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::types::test_event;
    use super::*;
    use crate::config::MeetupConfig;

    fn client_for(server: &MockServer) -> MeetupClient {
        MeetupClient::new(&MeetupConfig {
            api_key: "test-key".to_string(),
            base_url: server.uri(),
            events_page_size: 25,
            request_timeout: 5,
        })
        .expect("client builds")
    }

    #[test_case(EventStatus::Upcoming, Visibility::Public, true ; "upcoming public is selected")]
    #[test_case(EventStatus::Cancelled, Visibility::Public, false ; "cancelled is skipped")]
    #[test_case(EventStatus::Past, Visibility::Public, false ; "past is skipped")]
    #[test_case(EventStatus::Upcoming, Visibility::Members, false ; "members only is skipped")]
    #[test_case(EventStatus::Upcoming, Visibility::PublicLimited, false ; "public limited is skipped")]
    fn select_next_event_filters_single_event(
        status: EventStatus,
        visibility: Visibility,
        selected: bool,
    ) {
        let event = test_event("1", status, visibility);

        let next = select_next_event(vec![event.clone()]);

        assert_eq!(next, selected.then_some(event));
    }

    #[test]
    fn select_next_event_returns_none_for_empty_listing() {
        assert!(select_next_event(Vec::new()).is_none());
    }

    #[test]
    fn select_next_event_only_looks_at_the_first_slot() {
        let events = vec![
            test_event("1", EventStatus::Cancelled, Visibility::Public),
            test_event("2", EventStatus::Upcoming, Visibility::Public),
        ];

        assert!(select_next_event(events).is_none());
    }

    #[test]
    fn decode_events_ignores_unknown_fields_and_reads_venue() {
        let body = json!([{
            "id": "299",
            "name": "Ridge walk",
            "status": "upcoming",
            "visibility": "public",
            "time": 1_700_000_000_000_i64,
            "utc_offset": -18_000_000,
            "link": "https://www.meetup.com/acme-hikers/events/299/",
            "rsvp_limit": 20,
            "group": {"urlname": "acme-hikers"},
            "venue": {"id": 7, "name": "Trailhead", "address_1": "1 Forest Rd", "lat": 45.1, "lon": -122.6}
        }])
        .to_string();

        let events = decode_events(&body).expect("decodes");

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.name, "Ridge walk");
        assert_eq!(event.utc_offset, -18_000_000);
        assert!(event.is_announceable());
        let venue = event.venue.as_ref().expect("venue present");
        assert_eq!(venue.name, "Trailhead");
        assert_eq!(venue.address_1, "1 Forest Rd");
        assert_eq!(venue.city, "");
    }

    #[test]
    fn decode_events_maps_unknown_status_and_missing_visibility_to_other() {
        let body = r#"[{"id":"1","name":"x","status":"mystery","time":1}]"#;

        let events = decode_events(body).expect("decodes");

        assert_eq!(events[0].status, EventStatus::Other);
        assert_eq!(events[0].visibility, Visibility::Other);
        assert!(!events[0].is_announceable());
    }

    #[test]
    fn decode_events_reports_nested_venue_fields() {
        let body = r#"[{"id":"1","name":"x","status":"upcoming","time":1,"venue":{"name":"Trailhead","lat":"north"}}]"#;

        let err = decode_events(body).expect_err("must fail");

        assert!(matches!(err, MeetupError::Decode { ref path, .. } if path == "$[0].venue.lat"));
    }

    #[test]
    fn decode_events_treats_missing_and_null_fields_as_empty() {
        let body = r#"[{
            "name": null,
            "status": "upcoming",
            "visibility": "public",
            "time": 1700000000000,
            "venue": {"name": "Trailhead", "address_1": "1 Forest Rd", "address_2": null, "zip": null}
        }]"#;

        let events = decode_events(body).expect("decodes");

        let event = &events[0];
        assert_eq!(event.id, "");
        assert_eq!(event.name, "");
        assert!(event.is_announceable());
        let venue = event.venue.as_ref().expect("venue present");
        assert_eq!(venue.address_2, "");
        assert_eq!(venue.zip, "");
    }

    #[test]
    fn decode_events_rejects_an_object_at_the_root() {
        let err = decode_events(r#"{"errors":[{"code":"throttled"}]}"#).expect_err("must fail");

        assert!(matches!(err, MeetupError::Decode { ref path, .. } if path == "$"));
    }

    #[test]
    fn decode_events_reports_malformed_json_at_root() {
        let err = decode_events("{not json").expect_err("must fail");

        assert!(matches!(err, MeetupError::Decode { ref path, .. } if path == "$"));
    }

    #[test]
    fn decode_events_reports_the_offending_element() {
        let body = r#"[
            {"id":"1","name":"ok","status":"upcoming","time":1},
            {"id":"2","name":"bad","status":"upcoming","time":"tomorrow"}
        ]"#;

        let err = decode_events(body).expect_err("must fail");

        assert!(matches!(err, MeetupError::Decode { ref path, .. } if path == "$[1].time"));
    }

    #[tokio::test]
    async fn group_exists_is_false_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ghost-group"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let exists = client_for(&server)
            .group_exists("ghost-group")
            .await
            .expect("lookup succeeds");

        assert!(!exists);
    }

    #[tokio::test]
    async fn group_exists_is_true_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme-hikers"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"urlname": "acme-hikers"})))
            .mount(&server)
            .await;

        let exists = client_for(&server)
            .group_exists("acme-hikers")
            .await
            .expect("lookup succeeds");

        assert!(exists);
    }

    #[tokio::test]
    async fn group_exists_surfaces_other_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme-hikers"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .group_exists("acme-hikers")
            .await
            .expect_err("must fail");

        assert!(matches!(err, MeetupError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn resolve_next_requests_a_single_event_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme-hikers/events"))
            .and(query_param("key", "test-key"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "5",
                "name": "Ridge walk",
                "status": "upcoming",
                "visibility": "public",
                "time": 1_700_000_000_000_i64
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let next = client_for(&server)
            .resolve_next("acme-hikers")
            .await
            .expect("resolution succeeds")
            .expect("event selected");

        assert_eq!(next.id, "5");
    }

    #[tokio::test]
    async fn fetch_events_raw_returns_body_untouched() {
        let server = MockServer::start().await;
        let body = r#"[{"id":"5","name":"Ridge walk"}]"#;
        Mock::given(method("GET"))
            .and(path("/acme-hikers/events"))
            .and(query_param("page", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let raw = client_for(&server)
            .fetch_events_raw("acme-hikers", 25)
            .await
            .expect("fetch succeeds");

        assert_eq!(raw, body);
    }

    #[tokio::test]
    async fn list_events_maps_404_to_group_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ghost-group/events"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .list_events("ghost-group", 1)
            .await
            .expect_err("must fail");

        assert!(matches!(err, MeetupError::GroupNotFound { ref group } if group == "ghost-group"));
    }

    #[tokio::test]
    async fn group_names_are_sent_as_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a%2Fb"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let exists = client_for(&server)
            .group_exists("a/b")
            .await
            .expect("lookup succeeds");

        assert!(!exists);
    }

    #[tokio::test]
    async fn empty_group_name_is_rejected_without_a_request() {
        let server = MockServer::start().await;

        let err = client_for(&server)
            .group_exists("  ")
            .await
            .expect_err("must fail");

        assert!(matches!(err, MeetupError::InvalidGroup(_)));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
