use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::future::Future;
use url::Url;

/// One way of asking the delete endpoint to remove an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStrategy {
    /// POST with `{"id": ...}` as a JSON body and explicit JSON headers
    JsonPost,
    /// POST with the id in the query string and no body
    QueryPost,
    /// GET with the id in the query string
    QueryGet,
    /// DELETE with `{"id": ...}` as a JSON body
    DeleteVerb,
    /// POST with the JSON text sent as a plain-text simple request
    PlainPost,
}

/// Strategies in the order they are attempted
pub const DELETE_CHAIN: [DeleteStrategy; 5] = [
    DeleteStrategy::JsonPost,
    DeleteStrategy::QueryPost,
    DeleteStrategy::QueryGet,
    DeleteStrategy::DeleteVerb,
    DeleteStrategy::PlainPost,
];

impl DeleteStrategy {
    pub fn method(&self) -> Method {
        match self {
            DeleteStrategy::JsonPost | DeleteStrategy::QueryPost | DeleteStrategy::PlainPost => {
                Method::POST
            }
            DeleteStrategy::QueryGet => Method::GET,
            DeleteStrategy::DeleteVerb => Method::DELETE,
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self.method() {
            Method::GET => "GET",
            Method::DELETE => "DELETE",
            _ => "POST",
        }
    }

    /// Build the request this strategy sends for `event_id`
    pub fn request(&self, client: &Client, endpoint: &Url, event_id: &str) -> RequestBuilder {
        let body = json!({ "id": event_id });
        match self {
            DeleteStrategy::JsonPost => client
                .post(endpoint.clone())
                .header(ACCEPT, "application/json")
                .json(&body),
            DeleteStrategy::QueryPost => client.post(with_id_query(endpoint, event_id)),
            DeleteStrategy::QueryGet => client.get(with_id_query(endpoint, event_id)),
            DeleteStrategy::DeleteVerb => client.delete(endpoint.clone()).json(&body),
            DeleteStrategy::PlainPost => client
                .post(endpoint.clone())
                .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
                .body(body.to_string()),
        }
    }
}

impl fmt::Display for DeleteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeleteStrategy::JsonPost => "json-post",
            DeleteStrategy::QueryPost => "query-post",
            DeleteStrategy::QueryGet => "query-get",
            DeleteStrategy::DeleteVerb => "delete-verb",
            DeleteStrategy::PlainPost => "plain-post",
        };
        f.write_str(label)
    }
}

fn with_id_query(endpoint: &Url, event_id: &str) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut().append_pair("id", event_id);
    url
}

/// Run `attempt` for each strategy in order, one at a time, stopping at the
/// first success. Returns the winning strategy with its value.
pub async fn first_success<S, T, E, F, Fut>(strategies: &[S], mut attempt: F) -> Option<(S, T)>
where
    S: Copy,
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    for strategy in strategies {
        if let Ok(value) = attempt(*strategy).await {
            return Some((*strategy, value));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_chain_order() {
        let methods: Vec<&str> = DELETE_CHAIN.iter().map(|s| s.method_name()).collect();
        assert_eq!(methods, vec!["POST", "POST", "GET", "DELETE", "POST"]);
    }

    #[test]
    fn test_query_strategies_carry_id() {
        let client = Client::new();
        let endpoint = Url::parse("https://hooks.example.com/delete?token=abc").unwrap();

        let request = DeleteStrategy::QueryGet
            .request(&client, &endpoint, "evt 1")
            .build()
            .unwrap();
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.url().query(), Some("token=abc&id=evt+1"));
        assert!(request.body().is_none());

        let request = DeleteStrategy::JsonPost
            .request(&client, &endpoint, "evt-1")
            .build()
            .unwrap();
        assert_eq!(request.url().query(), Some("token=abc"));
        assert_eq!(request.headers()[ACCEPT], "application/json");
    }

    #[test]
    fn test_plain_post_is_simple_request() {
        let client = Client::new();
        let endpoint = Url::parse("https://hooks.example.com/delete").unwrap();
        let request = DeleteStrategy::PlainPost
            .request(&client, &endpoint, "evt-1")
            .build()
            .unwrap();
        assert_eq!(request.headers()[CONTENT_TYPE], "text/plain;charset=UTF-8");
        assert!(request.headers().get(ACCEPT).is_none());
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, br#"{"id":"evt-1"}"#);
    }

    #[tokio::test]
    async fn test_first_success_stops_early() {
        let tried = RefCell::new(Vec::new());
        let winner = first_success(&[1, 2, 3, 4], |n| {
            tried.borrow_mut().push(n);
            async move {
                if n == 2 {
                    Ok::<_, ()>(n * 10)
                } else {
                    Err(())
                }
            }
        })
        .await;

        assert_eq!(winner, Some((2, 20)));
        assert_eq!(*tried.borrow(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_first_success_exhausts() {
        let mut calls = 0;
        let winner = first_success(&DELETE_CHAIN, |_| {
            calls += 1;
            async { Err::<(), _>("nope") }
        })
        .await;

        assert!(winner.is_none());
        assert_eq!(calls, 5);
    }
}
