use std::fmt::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::ChatConfig;
use crate::error::ChatError;

pub const EMPTY_COMPLETION: &str = "No pude generar una respuesta.";
pub const UNAVAILABLE_REPLY: &str =
    "No pude conectarme con el asistente. Intenta nuevamente más tarde.";

const COMPARISON_KEYWORDS: [&str; 5] = ["compar", "vs", "diferencia", "todos", "equipo"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleEmployee {
    pub first_name: &'static str,
    pub last_name: &'static str,
    pub potential: f64,
    pub potential_label: &'static str,
    pub direct_manager: f64,
    pub direct_manager_label: &'static str,
    pub competencies: f64,
    pub competencies_label: Option<&'static str>,
    /// Team, agility, customer, future.
    pub pillars: [f64; 4],
    pub alert: Option<Alert>,
}

/// Something a manager should look at first. Lower ranks are listed earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub rank: u8,
    pub text: &'static str,
}

/// Scores keep at least one decimal, so 3.0 is not shown as 3.
fn score(value: f64) -> String {
    format!("{value:?}")
}

impl SampleEmployee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    fn mentioned_in(&self, folded_message: &str) -> bool {
        folded_message.contains(&fold(self.first_name))
            || folded_message.contains(&fold(self.last_name))
    }
}

/// Lowercases and strips the Spanish accents so "Zuñiga" matches "zuniga".
fn fold(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' | 'ü' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Read-only team data the assistant is primed with and that chat cards are
/// drawn from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceDataset {
    pub organization: &'static str,
    pub year: i32,
    pub employees: Vec<SampleEmployee>,
}

impl ReferenceDataset {
    pub fn sample() -> Self {
        Self {
            organization: "Falabella",
            year: 2024,
            employees: vec![
                SampleEmployee {
                    first_name: "Anibal",
                    last_name: "Retamal",
                    potential: 2.5,
                    potential_label: "Medio (Calibrado)",
                    direct_manager: 2.88,
                    direct_manager_label: "Cumple Parcial",
                    competencies: 2.88,
                    competencies_label: None,
                    pillars: [3.0, 3.0, 2.5, 3.0],
                    alert: Some(Alert {
                        rank: 2,
                        text: "\"Nos apasionamos por cliente\" bajo (2.5)",
                    }),
                },
                SampleEmployee {
                    first_name: "Alvaro",
                    last_name: "Marquez",
                    potential: 2.4,
                    potential_label: "Bajo (Calibrado)",
                    direct_manager: 3.13,
                    direct_manager_label: "Cumple Satisfactorio",
                    competencies: 3.38,
                    competencies_label: Some("Sobresaliente"),
                    pillars: [3.33, 3.33, 3.5, 3.33],
                    alert: Some(Alert {
                        rank: 1,
                        text: "Potencial Bajo (2.4), requiere plan de desarrollo",
                    }),
                },
                SampleEmployee {
                    first_name: "Paula",
                    last_name: "Roa",
                    potential: 2.5,
                    potential_label: "Medio (Calibrado)",
                    direct_manager: 3.75,
                    direct_manager_label: "Sobresaliente",
                    competencies: 3.75,
                    competencies_label: Some("Sobresaliente"),
                    pillars: [4.0, 3.5, 3.5, 4.0],
                    alert: None,
                },
                SampleEmployee {
                    first_name: "Angeles",
                    last_name: "Zuñiga",
                    potential: 3.0,
                    potential_label: "Medio +",
                    direct_manager: 3.38,
                    direct_manager_label: "Sobresaliente",
                    competencies: 3.14,
                    competencies_label: Some("Cumple Satisfactorio"),
                    pillars: [3.25, 3.19, 3.19, 2.94],
                    alert: None,
                },
            ],
        }
    }

    /// Employees a message refers to. Comparison wording brings in the
    /// whole team.
    pub fn mentioned(&self, message: &str) -> Vec<&SampleEmployee> {
        let folded = fold(message);
        let named: Vec<&SampleEmployee> = self
            .employees
            .iter()
            .filter(|e| e.mentioned_in(&folded))
            .collect();

        let comparing = COMPARISON_KEYWORDS.iter().any(|k| folded.contains(k));
        if comparing && named.len() < 2 {
            return self.employees.iter().collect();
        }
        named
    }

    pub fn system_prompt(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Eres un asistente de calibración de desempeño para managers de {}.",
            self.organization
        );
        let _ = writeln!(out, "Tu rol es ayudar a los managers a:");
        let _ = writeln!(out, "- Consultar evaluaciones de su equipo");
        let _ = writeln!(out, "- Identificar alertas y casos especiales");
        let _ = writeln!(out, "- Comparar desempeño entre colaboradores y años");
        let _ = writeln!(out, "- Preparar reuniones de calibración");
        let _ = writeln!(out);
        let _ = writeln!(out, "Datos del equipo {}:", self.year);
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "| Nombre | Potencial | Etiqueta | Jefe Directo | Competencias |"
        );
        let _ = writeln!(
            out,
            "|--------|-----------|----------|--------------|--------------|"
        );
        for e in &self.employees {
            let competencies = match e.competencies_label {
                Some(label) => format!("{} {}", score(e.competencies), label),
                None => score(e.competencies),
            };
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} {} | {} |",
                e.full_name(),
                score(e.potential),
                e.potential_label,
                score(e.direct_manager),
                e.direct_manager_label,
                competencies
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Competencias detalladas:");
        for e in &self.employees {
            let [team, agility, customer, future] = e.pillars;
            let _ = writeln!(
                out,
                "- {}: Somos un solo equipo: {} | Nos movemos ágilmente: {} | Nos apasionamos por cliente: {} | Cuidamos futuro: {}",
                e.first_name,
                score(team),
                score(agility),
                score(customer),
                score(future)
            );
        }

        let mut alerts: Vec<(&SampleEmployee, Alert)> = self
            .employees
            .iter()
            .filter_map(|e| e.alert.map(|alert| (e, alert)))
            .collect();
        alerts.sort_by_key(|(_, alert)| alert.rank);
        if !alerts.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Alertas:");
            for (e, alert) in alerts {
                let _ = writeln!(out, "- {}: {}", e.full_name(), alert.text);
            }
        }

        if !self.employees.is_empty() {
            let total = self.employees.len();
            let average =
                self.employees.iter().map(|e| e.potential).sum::<f64>() / total as f64;
            let _ = writeln!(out);
            let _ = writeln!(out, "Resumen:");
            let _ = writeln!(out, "- Total: {} colaboradores", total);
            let _ = writeln!(out, "- Promedio potencial: {:.1}", average);
            if let Some(best) = self
                .employees
                .iter()
                .max_by(|a, b| a.competencies.total_cmp(&b.competencies))
            {
                let _ = writeln!(
                    out,
                    "- Mejor evaluado: {} (competencias {})",
                    best.full_name(),
                    score(best.competencies)
                );
            }
            if let Some(lowest) = self
                .employees
                .iter()
                .min_by(|a, b| a.potential.total_cmp(&b.potential))
            {
                let _ = writeln!(
                    out,
                    "- Requiere atención: {} (potencial bajo)",
                    lowest.full_name()
                );
            }
        }

        let _ = writeln!(out);
        let _ = write!(
            out,
            "Responde en español, de forma concisa y profesional. Usa tablas markdown cuando sea útil."
        );
        out
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn completion_text(response: ChatCompletionsResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.is_empty())
        .unwrap_or_else(|| EMPTY_COMPLETION.to_string())
}

/// Forwards a conversation to an OpenAI-compatible completions endpoint,
/// primed with the reference dataset.
pub struct ChatRelay {
    config: ChatConfig,
    system_prompt: String,
    client: reqwest::Client,
}

impl ChatRelay {
    pub fn new(config: ChatConfig, dataset: &ReferenceDataset) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            system_prompt: dataset.system_prompt(),
            client,
        })
    }

    /// Returns the assistant's reply, or a fixed apology when the endpoint
    /// cannot be reached or answers with an error.
    pub async fn complete(&self, turns: &[ChatTurn]) -> String {
        match self.try_complete(turns).await {
            Ok(content) => content,
            Err(err) => {
                error!(endpoint = %self.config.endpoint, error = %err, "chat completion failed");
                UNAVAILABLE_REPLY.to_string()
            }
        }
    }

    async fn try_complete(&self, turns: &[ChatTurn]) -> Result<String, ChatError> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ChatTurn {
            role: Role::System,
            content: self.system_prompt.clone(),
        });
        messages.extend(turns.iter().cloned());

        let request = ChatCompletionsRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        debug!(endpoint = %self.config.endpoint, turns = turns.len(), "sending chat completion");
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ChatError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionsResponse = response.json().await?;
        Ok(completion_text(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PROMPT: &str = "Eres un asistente de calibración de desempeño para managers de Falabella.
Tu rol es ayudar a los managers a:
- Consultar evaluaciones de su equipo
- Identificar alertas y casos especiales
- Comparar desempeño entre colaboradores y años
- Preparar reuniones de calibración

Datos del equipo 2024:

| Nombre | Potencial | Etiqueta | Jefe Directo | Competencias |
|--------|-----------|----------|--------------|--------------|
| Anibal Retamal | 2.5 | Medio (Calibrado) | 2.88 Cumple Parcial | 2.88 |
| Alvaro Marquez | 2.4 | Bajo (Calibrado) | 3.13 Cumple Satisfactorio | 3.38 Sobresaliente |
| Paula Roa | 2.5 | Medio (Calibrado) | 3.75 Sobresaliente | 3.75 Sobresaliente |
| Angeles Zuñiga | 3.0 | Medio + | 3.38 Sobresaliente | 3.14 Cumple Satisfactorio |

Competencias detalladas:
- Anibal: Somos un solo equipo: 3.0 | Nos movemos ágilmente: 3.0 | Nos apasionamos por cliente: 2.5 | Cuidamos futuro: 3.0
- Alvaro: Somos un solo equipo: 3.33 | Nos movemos ágilmente: 3.33 | Nos apasionamos por cliente: 3.5 | Cuidamos futuro: 3.33
- Paula: Somos un solo equipo: 4.0 | Nos movemos ágilmente: 3.5 | Nos apasionamos por cliente: 3.5 | Cuidamos futuro: 4.0
- Angeles: Somos un solo equipo: 3.25 | Nos movemos ágilmente: 3.19 | Nos apasionamos por cliente: 3.19 | Cuidamos futuro: 2.94

Alertas:
- Alvaro Marquez: Potencial Bajo (2.4), requiere plan de desarrollo
- Anibal Retamal: \"Nos apasionamos por cliente\" bajo (2.5)

Resumen:
- Total: 4 colaboradores
- Promedio potencial: 2.6
- Mejor evaluado: Paula Roa (competencias 3.75)
- Requiere atención: Alvaro Marquez (potencial bajo)

Responde en español, de forma concisa y profesional. Usa tablas markdown cuando sea útil.";

    #[test]
    fn sample_prompt_is_rendered_exactly() {
        assert_eq!(ReferenceDataset::sample().system_prompt(), SAMPLE_PROMPT);
    }

    #[test]
    fn whole_number_scores_keep_a_decimal() {
        assert_eq!(score(3.0), "3.0");
        assert_eq!(score(4.0), "4.0");
        assert_eq!(score(2.88), "2.88");
    }

    #[test]
    fn alerts_follow_their_rank() {
        let mut dataset = ReferenceDataset::sample();
        dataset.employees.reverse();
        let prompt = dataset.system_prompt();
        let alvaro = prompt.find("- Alvaro Marquez: Potencial Bajo").expect("alvaro alert");
        let anibal = prompt.find("- Anibal Retamal: \"Nos apasionamos").expect("anibal alert");
        assert!(alvaro < anibal);
    }

    #[test]
    fn prompt_reflects_injected_dataset() {
        let mut dataset = ReferenceDataset::sample();
        dataset.year = 2025;
        dataset.employees.truncate(1);
        let prompt = dataset.system_prompt();
        assert!(prompt.contains("Datos del equipo 2025:"));
        assert!(prompt.contains("- Total: 1 colaboradores"));
        assert!(!prompt.contains("Paula Roa"));
    }

    #[test]
    fn mentions_match_names_without_accents() {
        let dataset = ReferenceDataset::sample();
        let names: Vec<String> = dataset
            .mentioned("¿Cómo le fue a Angeles ZUNIGA?")
            .iter()
            .map(|e| e.full_name())
            .collect();
        assert_eq!(names, vec!["Angeles Zuñiga".to_string()]);

        assert_eq!(dataset.mentioned("Hola, ¿qué puedes hacer?").len(), 0);
        assert_eq!(dataset.mentioned("muéstrame roa").len(), 1);
    }

    #[test]
    fn comparison_brings_in_the_team() {
        let dataset = ReferenceDataset::sample();
        assert_eq!(dataset.mentioned("resumen del equipo").len(), 4);
        let pair = dataset.mentioned("compara a Paula con Alvaro");
        let names: Vec<&str> = pair.iter().map(|e| e.first_name).collect();
        assert_eq!(names, vec!["Alvaro", "Paula"]);
    }

    #[test]
    fn completion_text_falls_back_when_empty() {
        let parsed: ChatCompletionsResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Hola"}}]}"#,
        )
        .expect("json");
        assert_eq!(completion_text(parsed), "Hola");

        let parsed: ChatCompletionsResponse =
            serde_json::from_str(r#"{"choices":[]}"#).expect("json");
        assert_eq!(completion_text(parsed), EMPTY_COMPLETION);

        let parsed: ChatCompletionsResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#,
        )
        .expect("json");
        assert_eq!(completion_text(parsed), EMPTY_COMPLETION);
    }

    #[test]
    fn request_puts_system_prompt_first() {
        let request = ChatCompletionsRequest {
            model: "local-model",
            messages: vec![
                ChatTurn {
                    role: Role::System,
                    content: "prompt".to_string(),
                },
                ChatTurn::user("hola"),
            ],
            temperature: 0.7,
            max_tokens: 1000,
            stream: false,
        };
        let value = serde_json::to_value(&request).expect("json");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["stream"], false);
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_apology() {
        let config = ChatConfig {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            timeout_secs: 2,
            ..ChatConfig::default()
        };
        let relay = ChatRelay::new(config, &ReferenceDataset::sample()).expect("client");
        let reply = relay.complete(&[ChatTurn::user("hola")]).await;
        assert_eq!(reply, UNAVAILABLE_REPLY);
    }
}
