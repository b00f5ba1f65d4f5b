//! Service Bus management REST client.
//!
//! Talks to `https://<namespace>.servicebus.windows.net` with
//! `api-version=2021-05`. Listing is paged with `$skip`/`$top`; each page
//! is an Atom feed. Every request carries a freshly signed SAS token.

use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use tracing::{debug, warn};

use busgauge_core::ConnectionString;

use crate::atom::{self, AtomEntry};
use crate::client::AdminClient;
use crate::error::{AdminError, AdminResult};
use crate::sas;
use crate::transport::HttpTransport;
use crate::types::{QueueDetail, SubscriptionDetail, TopicDetail};

const API_VERSION: &str = "2021-05";
/// Largest page the service returns.
const PAGE_SIZE: usize = 100;

const MAX_PAGES: usize = 1000;
/// Management port of the local Service Bus emulator.
const EMULATOR_PORT: u16 = 5300;

/// Characters escaped in entity path segments. `/` stays literal because
/// entity names may be hierarchical.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub struct ServiceBusClient {
    connection: ConnectionString,
    transport: HttpTransport,
}

impl ServiceBusClient {
    /// Build a client for the namespace named in `connection`.
    pub fn new(connection: ConnectionString, timeout: Duration) -> AdminResult<Self> {
        let transport = if connection.use_emulator {
            HttpTransport::plain(&connection.host, EMULATOR_PORT, timeout)
        } else {
            HttpTransport::https(&connection.host, timeout)?
        };
        debug!(
            namespace = %connection.namespace,
            host = %connection.host,
            scheme = transport.scheme(),
            "service bus admin client created"
        );
        Ok(Self {
            connection,
            transport,
        })
    }

    fn resource_uri(&self) -> String {
        format!("{}://{}/", self.transport.scheme(), self.connection.host)
    }

    async fn get(&self, path: &str, extra_query: &str) -> AdminResult<String> {
        let authorization = sas::token_from_now(
            &self.resource_uri(),
            &self.connection.key_name,
            &self.connection.key,
            sas::TOKEN_TTL,
        )?;
        let path_and_query = format!("/{path}?api-version={API_VERSION}{extra_query}");
        let resp = self.transport.get(&path_and_query, &authorization).await?;

        match resp.status {
            200..=299 => Ok(resp.body),
            404 => Err(AdminError::NotFound(path.to_string())),
            status => Err(AdminError::Status {
                status,
                body: truncate(&resp.body, 512),
            }),
        }
    }

    /// Fetch every page of a collection and return the entry titles.
    async fn list_titles(&self, collection: &str) -> AdminResult<Vec<String>> {
        let names = collect_pages(collection, move |skip| async move {
            let body = self
                .get(collection, &format!("&$skip={skip}&$top={PAGE_SIZE}"))
                .await?;
            let titles = atom::parse_entries(&body)?.into_iter().map(|e| e.title);
            Ok::<Vec<String>, AdminError>(titles.collect())
        })
        .await?;
        debug!(%collection, count = names.len(), "listed entities");
        Ok(names)
    }

    async fn entry(&self, path: &str) -> AdminResult<AtomEntry> {
        let body = self.get(path, "").await?;
        atom::parse_single(&body, path)
    }
}

/// Page through a listing until a short page. `fetch` gets the number of
/// titles already collected as its `$skip`.
async fn collect_pages<F, Fut>(collection: &str, mut fetch: F) -> AdminResult<Vec<String>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = AdminResult<Vec<String>>>,
{
    let mut names: Vec<String> = Vec::new();
    let mut previous_first: Option<String> = None;
    for _ in 0..MAX_PAGES {
        let page = fetch(names.len()).await?;
        // A server that ignores `$skip` serves the same page again.
        if page.first().is_some() && page.first() == previous_first.as_ref() {
            warn!(%collection, "listing repeated a page; stopping");
            return Ok(names);
        }
        let full = page.len() >= PAGE_SIZE;
        previous_first = page.first().cloned();
        names.extend(page);
        if !full {
            return Ok(names);
        }
    }
    warn!(%collection, pages = MAX_PAGES, "listing page limit reached");
    Ok(names)
}

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[async_trait]
impl AdminClient for ServiceBusClient {
    fn namespace(&self) -> &str {
        &self.connection.namespace
    }

    async fn list_queues(&self) -> AdminResult<Vec<String>> {
        self.list_titles("$Resources/Queues").await
    }

    async fn queue_detail(&self, name: &str) -> AdminResult<QueueDetail> {
        let mut detail = self.entry(&encode(name)).await?.into_queue();
        detail.name = name.to_string();
        Ok(detail)
    }

    async fn list_topics(&self) -> AdminResult<Vec<String>> {
        self.list_titles("$Resources/Topics").await
    }

    async fn topic_detail(&self, name: &str) -> AdminResult<TopicDetail> {
        let mut detail = self.entry(&encode(name)).await?.into_topic();
        detail.name = name.to_string();
        Ok(detail)
    }

    async fn list_subscriptions(&self, topic: &str) -> AdminResult<Vec<String>> {
        self.list_titles(&format!("{}/Subscriptions", encode(topic)))
            .await
    }

    async fn subscription_detail(
        &self,
        topic: &str,
        subscription: &str,
    ) -> AdminResult<SubscriptionDetail> {
        let path = format!("{}/Subscriptions/{}", encode(topic), encode(subscription));
        let mut detail = self.entry(&path).await?.into_subscription(topic);
        detail.name = subscription.to_string();
        Ok(detail)
    }
}
