use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::error::{ClientError, ClientResult};
use crate::io::{BULK_TIMEOUT, CaseSystem, METADATA_TIMEOUT, READ_TIMEOUT};
use crate::model::{Annotation, AnnotationKind, AnnotationUpdate, CaseRef};

/// Public GraphQL endpoint of Démarches Simplifiées.
pub const DEFAULT_API_URL: &str = "https://www.demarches-simplifiees.fr/api/v2/graphql";

/// Largest page the API serves for dossier listings.
const PAGE_SIZE: usize = 100;

const SCHEMA_QUERY: &str = "query { __schema { queryType { name } } }";

const LIST_DOSSIERS: &str = r#"
query getDossiers($demarcheNumber: Int!, $first: Int, $after: String) {
    demarche(number: $demarcheNumber) {
        id
        number
        dossiers(first: $first, after: $after) {
            pageInfo { hasNextPage endCursor }
            nodes { id number }
        }
    }
}
"#;

const DOSSIER_ANNOTATIONS: &str = r#"
query getDossier($dossierNumber: Int!) {
    dossier(number: $dossierNumber) {
        id
        number
        annotations {
            id
            label
            stringValue
            __typename
        }
    }
}
"#;

/// GraphQL client for the Démarches Simplifiées instructor API.
pub struct DsClient {
    http: Client,
    api_url: String,
    token: String,
    instructeur_id: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct DemarcheData {
    demarche: Option<Demarche>,
}

#[derive(Debug, Deserialize)]
struct Demarche {
    dossiers: DossierConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DossierConnection {
    page_info: PageInfo,
    nodes: Vec<CaseRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DossierData {
    dossier: Option<DossierAnnotations>,
}

#[derive(Debug, Deserialize)]
struct DossierAnnotations {
    annotations: Vec<RawAnnotation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnnotation {
    id: String,
    label: String,
    string_value: Option<String>,
    #[serde(rename = "__typename")]
    typename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MutationPayload {
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

impl From<RawAnnotation> for Annotation {
    fn from(raw: RawAnnotation) -> Self {
        Annotation {
            id: raw.id,
            label: raw.label,
            value: raw.string_value,
            kind: raw.typename.as_deref().map(AnnotationKind::from_typename),
        }
    }
}

impl DsClient {
    /// Creates a client acting on behalf of `instructeur_id`.
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        instructeur_id: impl Into<String>,
    ) -> ClientResult<Self> {
        let http = Client::builder().timeout(BULK_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            token: token.into(),
            instructeur_id: instructeur_id.into(),
        })
    }

    fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
        timeout: Duration,
    ) -> ClientResult<T> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .timeout(timeout)
            .json(&json!({ "query": query, "variables": variables }))
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        let payload: GraphQlResponse<T> = response
            .json()
            .map_err(|err| ClientError::Decode(err.to_string()))?;
        if !payload.errors.is_empty() {
            return Err(ClientError::GraphQl(
                payload.errors.into_iter().map(|error| error.message).collect(),
            ));
        }
        payload
            .data
            .ok_or_else(|| ClientError::Decode("response without data".into()))
    }
}

impl CaseSystem for DsClient {
    fn test_connection(&self) -> ClientResult<()> {
        let _: serde_json::Value = self.execute(SCHEMA_QUERY, json!({}), METADATA_TIMEOUT)?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn list_cases(&self, process_number: i64, limit: usize) -> ClientResult<Vec<CaseRef>> {
        let mut cases = Vec::new();
        let mut cursor: Option<String> = None;

        while cases.len() < limit {
            let first = PAGE_SIZE.min(limit - cases.len());
            let data: DemarcheData = self.execute(
                LIST_DOSSIERS,
                json!({ "demarcheNumber": process_number, "first": first, "after": cursor }),
                BULK_TIMEOUT,
            )?;
            let demarche = data
                .demarche
                .ok_or_else(|| ClientError::NotFound(format!("démarche {process_number}")))?;

            let connection = demarche.dossiers;
            cases.extend(connection.nodes);
            match connection.page_info {
                PageInfo {
                    has_next_page: true,
                    end_cursor: Some(next),
                } => cursor = Some(next),
                _ => break,
            }
        }

        cases.truncate(limit);
        info!(count = cases.len(), process_number, "listed dossiers");
        Ok(cases)
    }

    #[instrument(level = "debug", skip(self))]
    fn case_annotations(&self, case_number: i64) -> ClientResult<Vec<Annotation>> {
        let data: DossierData = self.execute(
            DOSSIER_ANNOTATIONS,
            json!({ "dossierNumber": case_number }),
            READ_TIMEOUT,
        )?;
        let dossier = data
            .dossier
            .ok_or_else(|| ClientError::NotFound(format!("dossier {case_number}")))?;

        let annotations: Vec<Annotation> = dossier.annotations.into_iter().map(Annotation::from).collect();
        for annotation in annotations.iter().filter(|annotation| annotation.kind.is_none()) {
            warn!(label = %annotation.label, "annotation without __typename");
        }
        debug!(count = annotations.len(), "fetched annotations");
        Ok(annotations)
    }

    #[instrument(level = "debug", skip(self, update), fields(kind = ?update.kind))]
    fn update_annotation(
        &self,
        case_id: &str,
        annotation_id: &str,
        update: &AnnotationUpdate,
    ) -> ClientResult<()> {
        let suffix = update.kind.mutation_suffix();
        let name = format!("dossierModifierAnnotation{suffix}");
        let mutation = format!(
            "mutation {name}($input: DossierModifierAnnotation{suffix}Input!) {{ \
             {name}(input: $input) {{ \
             annotation {{ id label stringValue updatedAt }} \
             errors {{ message }} }} }}"
        );
        let variables = json!({
            "input": {
                "annotationId": annotation_id,
                "clientMutationId": format!("update-{}-{annotation_id}", update.kind.tag()),
                "dossierId": case_id,
                "instructeurId": self.instructeur_id,
                "value": update.value,
            }
        });

        let mut data: serde_json::Map<String, serde_json::Value> =
            self.execute(&mutation, variables, BULK_TIMEOUT)?;
        let payload = data
            .remove(&name)
            .filter(|payload| !payload.is_null())
            .ok_or_else(|| ClientError::Decode(format!("missing {name} payload")))?;
        let payload: MutationPayload =
            serde_json::from_value(payload).map_err(|err| ClientError::Decode(err.to_string()))?;

        match payload.errors {
            Some(errors) if !errors.is_empty() => Err(ClientError::GraphQl(
                errors.into_iter().map(|error| error.message).collect(),
            )),
            _ => Ok(()),
        }
    }
}
