//! Prompt assembly and the external model process.
//!
//! The prompt is a fixed system sentence, the retrieved context, an
//! optional attached file and the question, in that order. When there is
//! neither context nor attachment the prompt is the bare question.
//!
//! The model is any command that reads a prompt on stdin and writes the
//! answer to stdout (by default `ollama run <model>`).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use crate::config::{Config, ModelConfig};
use crate::embedding::create_embedder;
use crate::error::ModelError;
use crate::load::read_text_lossy;
use crate::models::Category;
use crate::retrieve::{RetrievalKind, Retriever};
use crate::store::open_store;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Assis, a virtual assistant specialized in Linux.";

/// A user-supplied file appended to the context.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub path: PathBuf,
    pub text: String,
}

impl Attachment {
    pub fn read(path: &Path) -> Result<Self, crate::error::LoadError> {
        Ok(Self {
            path: path.to_path_buf(),
            text: read_text_lossy(path)?,
        })
    }

    fn render(&self) -> String {
        format!(
            "\n### Contents of file {}:\n{}\n",
            self.path.display(),
            self.text
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// System sentence, context and question.
    Framed(String),
    /// Nothing to ground on: the question alone.
    Bare(String),
}

impl Prompt {
    pub fn text(&self) -> &str {
        match self {
            Prompt::Framed(text) | Prompt::Bare(text) => text,
        }
    }

    pub fn is_bare(&self) -> bool {
        matches!(self, Prompt::Bare(_))
    }
}

pub fn build_prompt(
    system_prompt: &str,
    query: &str,
    context: &str,
    attachment: Option<&Attachment>,
) -> Prompt {
    let mut body = context.to_string();
    if let Some(attachment) = attachment {
        body.push_str(&attachment.render());
    }

    if body.trim().is_empty() {
        return Prompt::Bare(query.to_string());
    }

    Prompt::Framed(format!(
        "{}\nBase your answer on the information below:\n\n{}\n\nNow answer the question:\n{}\n",
        system_prompt, body, query
    ))
}

/// Raw result of one model invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl ModelOutput {
    /// Trimmed stdout, or `None` when the model printed nothing.
    pub fn answer(&self) -> Option<&str> {
        let answer = self.stdout.trim();
        (!answer.is_empty()).then_some(answer)
    }

    /// Notice for a failed exit: the exit status, then stderr if any.
    ///
    /// `None` after a successful exit, even when stderr is non-empty.
    pub fn failure(&self) -> Option<String> {
        if self.success {
            return None;
        }
        let status = match self.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        let stderr = self.stderr.trim();
        Some(if stderr.is_empty() {
            status
        } else {
            format!("{}\n{}", status, stderr)
        })
    }
}

/// Text-in, text-out generation. One round trip per call, no session.
#[async_trait]
pub trait ModelProcess: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<ModelOutput, ModelError>;
}

/// Runs `command args...` with the prompt on stdin.
pub struct CommandModel {
    command: String,
    args: Vec<String>,
}

impl CommandModel {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }
}

#[async_trait]
impl ModelProcess for CommandModel {
    async fn generate(&self, prompt: &str) -> Result<ModelOutput, ModelError> {
        let mut child = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ModelError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        // Feed stdin while stdout and stderr drain, so a model that echoes
        // or streams output cannot fill its pipe and stall the write.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    // A model that exits without reading its input is judged
                    // by its exit status, not by the broken pipe.
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        return Err(e);
                    }
                }
            }
            Ok(())
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        fed?;
        Ok(ModelOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            success: output.status.success(),
        })
    }
}

/// Builds the prompt and hands it to the model.
pub struct Answerer {
    model: Arc<dyn ModelProcess>,
    system_prompt: String,
}

impl Answerer {
    pub fn new(model: Arc<dyn ModelProcess>, system_prompt: impl Into<String>) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
        }
    }

    pub async fn answer(
        &self,
        query: &str,
        context: &str,
        attachment: Option<&Attachment>,
    ) -> Result<(Prompt, ModelOutput), ModelError> {
        let prompt = build_prompt(&self.system_prompt, query, context, attachment);
        tracing::debug!(bare = prompt.is_bare(), chars = prompt.text().len(), "prompt built");
        let output = self.model.generate(prompt.text()).await?;
        Ok((prompt, output))
    }
}

/// `assis ask`: retrieve context for the question and print the answer.
pub async fn run_ask(
    config: &Config,
    words: &[String],
    file: Option<&Path>,
    category: Option<Category>,
) -> Result<()> {
    let query = words.join(" ");
    if query.trim().is_empty() {
        bail!("No question given");
    }

    let attachment = match file {
        Some(path) => match Attachment::read(path) {
            Ok(attachment) => Some(attachment),
            Err(e) => {
                eprintln!("warning: could not read attached file: {}", e);
                None
            }
        },
        None => None,
    };

    let embedder = create_embedder(&config.embedding)?;
    let store = open_store(&config.store)
        .await
        .context("cannot open vector store")?;
    let retriever = Retriever::new(embedder, store);
    let retrieval = retriever
        .retrieve(
            &query,
            category,
            config.retrieval.top_k,
            config.retrieval.threshold,
        )
        .await
        .context("retrieval failed")?;

    match retrieval.kind {
        RetrievalKind::Empty => {
            println!("No relevant context found. Using the model's own knowledge.\n");
        }
        RetrievalKind::Fallback => {
            tracing::info!("nothing within threshold; answering from the nearest match");
        }
        RetrievalKind::Relevant => {}
    }

    let model = CommandModel::from_config(&config.model);
    let answerer = Answerer::new(Arc::new(model), config.model.system_prompt.clone());
    let (_, output) = answerer
        .answer(&query, &retrieval.context, attachment.as_ref())
        .await
        .context("cannot run model")?;

    println!("ANSWER:\n");
    match output.answer() {
        Some(answer) => println!("{}", answer),
        None => println!("(empty answer)"),
    }

    if let Some(failure) = output.failure() {
        println!("\nModel process failed:");
        println!("{}", failure);
    }
    Ok(())
}
