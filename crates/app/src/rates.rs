use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use smsledger_core::ParsedMessage;
use smsledger_storage::{JournalError, JournalStore, RateRecord};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RateError {
    #[error("rate request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate service returned status {0}")]
    Status(u16),
    #[error("rate service returned invalid XML: {0}")]
    InvalidXml(String),
    #[error("currency {currency} not found in exchange rates for {date}")]
    CurrencyNotFound { currency: String, date: NaiveDate },
    #[error(transparent)]
    Journal(#[from] JournalError),
}

/// Home-currency units per one unit of `currency` on `date`.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn get_or_fetch_rate(&self, date: NaiveDate, currency: &str) -> Result<f64, RateError>;
}

/// Fetches the full rate table for a day.
#[async_trait]
pub trait RateFetcher: Send + Sync {
    async fn fetch_rates(&self, date: NaiveDate) -> Result<Vec<RateRecord>, RateError>;
}

// ── Central bank XML feed ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ValCurs {
    #[serde(rename = "Valute", default)]
    valutes: Vec<Valute>,
}

#[derive(Debug, Deserialize)]
struct Valute {
    #[serde(rename = "CharCode")]
    char_code: String,
    #[serde(rename = "Nominal", default = "one")]
    nominal: u32,
    #[serde(rename = "Value")]
    value: String,
}

fn one() -> u32 {
    1
}

/// Parses a `ValCurs` document. Entries with an unreadable value are skipped;
/// values quoted per `Nominal` units are scaled down to one unit.
pub fn parse_val_curs(body: &str, date: NaiveDate) -> Result<Vec<RateRecord>, RateError> {
    let trimmed = body.trim();
    if !trimmed.starts_with('<') {
        return Err(RateError::InvalidXml("response is not XML".to_string()));
    }
    let doc: ValCurs =
        quick_xml::de::from_str(trimmed).map_err(|e| RateError::InvalidXml(e.to_string()))?;

    Ok(doc
        .valutes
        .into_iter()
        .filter_map(|v| {
            let mut value: f64 = v.value.trim().replace(',', ".").parse().ok()?;
            if v.nominal > 1 {
                value /= f64::from(v.nominal);
            }
            Some(RateRecord::new(date, &v.char_code, value))
        })
        .collect())
}

pub struct BnmRateFetcher {
    http: reqwest::Client,
    base_url: String,
}

impl BnmRateFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RateError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }
}

#[async_trait]
impl RateFetcher for BnmRateFetcher {
    async fn fetch_rates(&self, date: NaiveDate) -> Result<Vec<RateRecord>, RateError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("get_xml", "1".to_string()),
                ("date", date.format("%d.%m.%Y").to_string()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RateError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        let rates = parse_val_curs(&body, date)?;
        debug!(%date, count = rates.len(), "fetched exchange rates");
        Ok(rates)
    }
}

// ── Cached provider ───────────────────────────────────────────────────────────

/// Home-currency short-circuit, then the journal cache, then the fetcher.
pub struct CachedRateProvider<F: RateFetcher> {
    journal: Arc<JournalStore>,
    fetcher: F,
    home_currency: String,
}

impl<F: RateFetcher> CachedRateProvider<F> {
    pub fn new(journal: Arc<JournalStore>, fetcher: F, home_currency: &str) -> Self {
        Self {
            journal,
            fetcher,
            home_currency: home_currency.to_string(),
        }
    }
}

#[async_trait]
impl<F: RateFetcher> RateProvider for CachedRateProvider<F> {
    async fn get_or_fetch_rate(&self, date: NaiveDate, currency: &str) -> Result<f64, RateError> {
        if currency == self.home_currency {
            return Ok(1.0);
        }

        let key = RateRecord::key_for(date, currency);
        if let Some(cached) = self.journal.get::<RateRecord>(&key).await? {
            return Ok(cached.value);
        }

        let found = self
            .fetcher
            .fetch_rates(date)
            .await?
            .into_iter()
            .find(|r| r.currency == currency)
            .ok_or_else(|| RateError::CurrencyNotFound {
                currency: currency.to_string(),
                date,
            })?;

        let value = found.value;
        self.journal.upsert(found).await?;
        Ok(value)
    }
}

/// Fills `converted` on every syncable message. Home-currency amounts never
/// reach the provider. A failed lookup leaves `converted` unset, which keeps
/// the item out of the home-currency filter.
pub async fn convert_transactions(
    provider: &dyn RateProvider,
    parsed: &mut [ParsedMessage],
    home_currency: &str,
) {
    for pm in parsed.iter_mut().filter(|pm| pm.is_syncable()) {
        let date = pm.message.utc_day();
        let Some(tx) = pm.transaction.as_mut() else {
            continue;
        };

        if tx.original.is_in(home_currency) {
            tx.converted = Some(tx.original.clone());
            continue;
        }

        match provider.get_or_fetch_rate(date, &tx.original.currency).await {
            Ok(rate) => tx.converted = Some(tx.original.convert(rate, home_currency)),
            Err(e) => {
                warn!(currency = %tx.original.currency, %date, error = %e, "failed to get exchange rate");
                tx.converted = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use smsledger_core::{Amount, RawMessage, Transaction};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ValCurs Date="08.04.2024" name="Official exchange rate">
  <Valute ID="47">
    <NumCode>978</NumCode>
    <CharCode>EUR</CharCode>
    <Nominal>1</Nominal>
    <Name>Euro</Name>
    <Value>19,1234</Value>
  </Valute>
  <Valute ID="44">
    <NumCode>643</NumCode>
    <CharCode>RUB</CharCode>
    <Nominal>10</Nominal>
    <Name>Russian Ruble</Name>
    <Value>1,9000</Value>
  </Valute>
  <Valute ID="1">
    <NumCode>840</NumCode>
    <CharCode>USD</CharCode>
    <Nominal>1</Nominal>
    <Name>US Dollar</Name>
    <Value>n/a</Value>
  </Valute>
</ValCurs>"#;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 8).unwrap()
    }

    /// Fixed rate that records every `(date, currency)` lookup.
    struct StaticRateProvider {
        rate: Option<f64>,
        lookups: Mutex<Vec<(NaiveDate, String)>>,
    }

    impl StaticRateProvider {
        fn new(rate: Option<f64>) -> Self {
            Self {
                rate,
                lookups: Mutex::new(Vec::new()),
            }
        }

        fn lookups(&self) -> Vec<(NaiveDate, String)> {
            self.lookups.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RateProvider for StaticRateProvider {
        async fn get_or_fetch_rate(&self, date: NaiveDate, currency: &str) -> Result<f64, RateError> {
            self.lookups
                .lock()
                .unwrap()
                .push((date, currency.to_string()));
            self.rate.ok_or_else(|| RateError::CurrencyNotFound {
                currency: currency.to_string(),
                date,
            })
        }
    }

    struct CountingFetcher {
        rates: Vec<RateRecord>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RateFetcher for CountingFetcher {
        async fn fetch_rates(&self, _date: NaiveDate) -> Result<Vec<RateRecord>, RateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.rates.clone())
        }
    }

    fn parsed(currency: &str, value: f64) -> ParsedMessage {
        ParsedMessage {
            message: RawMessage::new(
                Utc.with_ymd_and_hms(2024, 4, 8, 23, 30, 0).unwrap(),
                "102",
                "",
            ),
            transaction: Some(Transaction {
                original: Amount::new(value, currency),
                ..Transaction::default()
            }),
            has_template: true,
            ignored: false,
        }
    }

    #[test]
    fn parses_rates_with_comma_decimals_and_nominal() {
        let rates = parse_val_curs(XML, day()).unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0], RateRecord::new(day(), "EUR", 19.1234));
        assert_eq!(rates[1].currency, "RUB");
        assert!((rates[1].value - 0.19).abs() < 1e-9);
    }

    #[test]
    fn non_xml_body_is_rejected() {
        assert!(matches!(
            parse_val_curs("Service unavailable", day()),
            Err(RateError::InvalidXml(_))
        ));
        assert!(matches!(parse_val_curs("  ", day()), Err(RateError::InvalidXml(_))));
    }

    #[tokio::test]
    async fn bnm_fetcher_requests_day_in_local_format() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rates"))
            .and(query_param("get_xml", "1"))
            .and(query_param("date", "08.04.2024"))
            .respond_with(ResponseTemplate::new(200).set_body_string(XML))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher =
            BnmRateFetcher::new(&format!("{}/rates", server.uri()), Duration::from_secs(5)).unwrap();
        let rates = fetcher.fetch_rates(day()).await.unwrap();
        assert_eq!(rates.len(), 2);
    }

    #[tokio::test]
    async fn bnm_fetcher_surfaces_bad_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let fetcher = BnmRateFetcher::new(&server.uri(), Duration::from_secs(5)).unwrap();
        assert!(matches!(
            fetcher.fetch_rates(day()).await,
            Err(RateError::Status(502))
        ));
    }

    #[tokio::test]
    async fn cached_provider_fetches_once_and_stores_only_requested() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Arc::new(JournalStore::open(dir.path().join("d.json")).await.unwrap());
        let fetcher = CountingFetcher {
            rates: parse_val_curs(XML, day()).unwrap(),
            calls: AtomicUsize::new(0),
        };
        let provider = CachedRateProvider::new(journal.clone(), fetcher, "MDL");

        assert_eq!(provider.get_or_fetch_rate(day(), "EUR").await.unwrap(), 19.1234);
        assert_eq!(provider.get_or_fetch_rate(day(), "EUR").await.unwrap(), 19.1234);
        assert_eq!(provider.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            journal.all::<RateRecord>().await.unwrap(),
            vec![RateRecord::new(day(), "EUR", 19.1234)]
        );
    }

    #[tokio::test]
    async fn cached_provider_home_currency_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Arc::new(JournalStore::open(dir.path().join("d.json")).await.unwrap());
        let fetcher = CountingFetcher {
            rates: vec![],
            calls: AtomicUsize::new(0),
        };
        let provider = CachedRateProvider::new(journal, fetcher, "MDL");

        assert_eq!(provider.get_or_fetch_rate(day(), "MDL").await.unwrap(), 1.0);
        assert_eq!(provider.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cached_provider_unknown_currency() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Arc::new(JournalStore::open(dir.path().join("d.json")).await.unwrap());
        let fetcher = CountingFetcher {
            rates: parse_val_curs(XML, day()).unwrap(),
            calls: AtomicUsize::new(0),
        };
        let provider = CachedRateProvider::new(journal, fetcher, "MDL");

        assert!(matches!(
            provider.get_or_fetch_rate(day(), "GBP").await,
            Err(RateError::CurrencyNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn home_currency_never_calls_provider() {
        let provider = StaticRateProvider::new(Some(99.0));
        let mut items = vec![parsed("MDL", 34.0)];

        convert_transactions(&provider, &mut items, "MDL").await;

        assert!(provider.lookups().is_empty());
        let tx = items[0].transaction.as_ref().unwrap();
        assert_eq!(tx.converted.as_ref(), Some(&tx.original));
    }

    #[tokio::test]
    async fn foreign_currency_is_converted_on_message_day() {
        let provider = StaticRateProvider::new(Some(19.0));
        // 23:30 UTC stays on the 8th.
        let mut items = vec![parsed("EUR", 2.0)];

        convert_transactions(&provider, &mut items, "MDL").await;

        assert_eq!(provider.lookups(), vec![(day(), "EUR".to_string())]);
        let tx = items[0].transaction.as_ref().unwrap();
        assert_eq!(tx.converted, Some(Amount::new(38.0, "MDL")));
        assert!(tx.is_converted_to("MDL"));
    }

    #[tokio::test]
    async fn lookup_day_ignores_date_text_in_message() {
        let provider = StaticRateProvider::new(Some(19.0));
        let mut item = parsed("EUR", 2.0);
        if let Some(tx) = item.transaction.as_mut() {
            tx.date_time = Some("09.04.2024 01:30:00".to_string());
        }
        let mut items = vec![item];

        convert_transactions(&provider, &mut items, "MDL").await;

        assert_eq!(provider.lookups(), vec![(day(), "EUR".to_string())]);
    }

    #[tokio::test]
    async fn failed_lookup_leaves_unconverted() {
        let provider = StaticRateProvider::new(None);
        let mut items = vec![parsed("EUR", 2.0)];

        convert_transactions(&provider, &mut items, "MDL").await;

        let tx = items[0].transaction.as_ref().unwrap();
        assert_eq!(tx.converted, None);
        assert!(!tx.is_converted_to("MDL"));
    }

    #[tokio::test]
    async fn ignored_messages_are_not_converted() {
        let provider = StaticRateProvider::new(Some(19.0));
        let mut item = parsed("EUR", 2.0);
        item.ignored = true;
        let mut items = vec![item];

        convert_transactions(&provider, &mut items, "MDL").await;
        assert!(provider.lookups().is_empty());
    }
}
