/*!
Client HTTP scripté pour tester les plugins sans réseau

Deux modes de réponse :
- routes persistantes, choisies par fragment d'URL (cartes DL2 interrogées en boucle)
- file de réponses consommées dans l'ordre (séquences de push réussis/échoués)

La file est prioritaire. Une URL sans route ni réponse en file est refusée
comme un hôte injoignable. Toutes les requêtes sont enregistrées.
*/

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use symbion_plugin_common::http::{host_of, HttpClient, HttpResponse, TransportError};
use url::Url;

#[derive(Debug, Clone)]
pub enum Scripted {
    Respond { status: u16, body: String },
    Refuse,
    Timeout,
}

#[derive(Clone, Default)]
pub struct MockHttpClient {
    routes: Arc<Mutex<Vec<(String, Scripted)>>>,
    queue: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<Url>>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Répond `status`/`body` à toute URL contenant `fragment`
    pub fn route(&self, fragment: &str, status: u16, body: impl Into<String>) -> &Self {
        self.routes.lock().unwrap().push((
            fragment.to_string(),
            Scripted::Respond { status, body: body.into() },
        ));
        self
    }

    /// Refuse la connexion pour toute URL contenant `fragment`
    pub fn refuse(&self, fragment: &str) -> &Self {
        self.routes.lock().unwrap().push((fragment.to_string(), Scripted::Refuse));
        self
    }

    pub fn enqueue(&self, answer: Scripted) -> &Self {
        self.queue.lock().unwrap().push_back(answer);
        self
    }

    pub fn enqueue_status(&self, status: u16) -> &Self {
        self.enqueue(Scripted::Respond { status, body: String::new() })
    }

    pub fn requests(&self) -> Vec<Url> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, fragment: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.as_str().contains(fragment))
            .count()
    }

    fn answer(&self, url: &Url) -> Scripted {
        if let Some(queued) = self.queue.lock().unwrap().pop_front() {
            return queued;
        }
        self.routes
            .lock()
            .unwrap()
            .iter()
            .find(|(fragment, _)| url.as_str().contains(fragment.as_str()))
            .map(|(_, answer)| answer.clone())
            .unwrap_or(Scripted::Refuse)
    }
}

impl HttpClient for MockHttpClient {
    async fn get(&self, url: &Url) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(url.clone());
        log::info!("[MOCK] GET {}", url);

        match self.answer(url) {
            Scripted::Respond { status, body } => Ok(HttpResponse { status, body }),
            Scripted::Refuse => Err(TransportError::Connect {
                host: host_of(url),
                reason: "connection refused".to_string(),
            }),
            Scripted::Timeout => Err(TransportError::Timeout { host: host_of(url) }),
        }
    }
}
