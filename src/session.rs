//! Per-user conversation state.
//!
//! A [`Session`] holds the active document's retriever and the transcript.
//! The transcript belongs to one document: activating a different upload,
//! or deactivating, clears it.

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;

use docgpt_core::models::ChatTurn;
use docgpt_core::prompt::assemble;
use docgpt_core::retriever::Retriever;
use docgpt_core::transcript::Transcript;

use crate::completion::{run_completion, StreamHandler};
use crate::ingest::FileKey;
use crate::llm::ChatBackend;

/// The document questions are currently answered from.
#[derive(Clone)]
pub struct ActiveDocument {
    pub key: FileKey,
    pub name: String,
    pub retriever: Arc<Retriever>,
}

pub struct Session {
    transcript: Transcript,
    active: Option<ActiveDocument>,
    language: String,
}

impl Session {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            transcript: Transcript::new(),
            active: None,
            language: language.into(),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn active(&self) -> Option<&ActiveDocument> {
        self.active.as_ref()
    }

    /// Make `doc` the active document. Re-activating the same upload keeps
    /// the conversation; a different one starts fresh.
    pub fn activate(&mut self, doc: ActiveDocument) {
        let same = self.active.as_ref().map(|a| &a.key) == Some(&doc.key);
        if !same {
            tracing::debug!(file = %doc.name, key = %doc.key, "new document, clearing transcript");
            self.transcript.reset();
        }
        self.active = Some(doc);
    }

    pub fn deactivate(&mut self) {
        self.active = None;
        self.transcript.reset();
    }

    pub fn reset(&mut self) {
        self.transcript.reset();
    }

    /// Answer `question` from the active document.
    ///
    /// The question is recorded as a human turn before anything else; the
    /// answer is recorded as an AI turn only once the stream settles.
    pub async fn ask(
        &mut self,
        question: &str,
        backend: &dyn ChatBackend,
        handler: &mut dyn StreamHandler,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let Some(doc) = self.active.clone() else {
            bail!("No document loaded. Open a .pdf, .txt or .docx file first.");
        };

        self.transcript.append(ChatTurn::human(question));

        let context = doc.retriever.retrieve(question).await?;
        tracing::debug!(file = %doc.name, retrieved = context.len(), "context retrieved");
        let prompt = assemble(&context, question, &self.language);

        let answer = run_completion(backend, &prompt, handler, cancel).await?;
        self.transcript.append(ChatTurn::ai(answer.clone()));
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::testing::{RecordingHandler, ScriptedBackend};
    use crate::remote::RemoteError;
    use async_trait::async_trait;
    use docgpt_core::embedding::Embedder;
    use docgpt_core::models::{Chunk, Role};
    use docgpt_core::store::memory::InMemoryVectorStore;

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| if t.contains("cat") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                .collect())
        }
    }

    fn chunk(i: i64, text: &str) -> Chunk {
        Chunk {
            id: format!("c{}", i),
            document_id: "doc".into(),
            chunk_index: i,
            text: text.into(),
            hash: String::new(),
            start: 0,
            end: text.len(),
        }
    }

    fn document(name: &str) -> ActiveDocument {
        let chunks = vec![chunk(0, "cats purr"), chunk(1, "dogs bark")];
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let store = InMemoryVectorStore::build(chunks, vectors).unwrap();
        ActiveDocument {
            key: FileKey::of(name, name.as_bytes()),
            name: name.into(),
            retriever: Arc::new(Retriever::new(Arc::new(store), Arc::new(AxisEmbedder), 4)),
        }
    }

    fn unauthorized() -> anyhow::Error {
        RemoteError::Unauthorized("401".into()).into()
    }

    #[tokio::test]
    async fn answered_question_adds_two_turns() {
        let mut session = Session::new("English");
        session.activate(document("a.txt"));
        let backend = ScriptedBackend::tokens(&["Cats ", "purr."]);
        let mut handler = RecordingHandler::default();

        let answer = session
            .ask("What do cats do?", &backend, &mut handler, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(answer, "Cats purr.");
        let turns = session.transcript().all();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role(), Role::Human);
        assert_eq!(turns[0].message(), "What do cats do?");
        assert_eq!(turns[1].role(), Role::Ai);
        assert_eq!(turns[1].message(), "Cats purr.");
    }

    #[tokio::test]
    async fn unrelated_question_commits_dont_know_reply() {
        let mut session = Session::new("English");
        session.activate(document("a.txt"));
        let backend = ScriptedBackend::tokens(&["I don't know."]);
        let mut handler = RecordingHandler::default();

        session
            .ask("Who won the 1998 World Cup?", &backend, &mut handler, &CancellationToken::new())
            .await
            .unwrap();

        let last = session.transcript().all().last().unwrap();
        assert_eq!(last.role(), Role::Ai);
        assert_eq!(last.message(), "I don't know.");
    }

    #[tokio::test]
    async fn rejected_credential_commits_only_the_question() {
        let mut session = Session::new("English");
        session.activate(document("a.txt"));
        let backend = ScriptedBackend {
            items: vec![],
            fail_open: Some(unauthorized),
            hang_after_items: false,
        };
        let mut handler = RecordingHandler::default();

        let err = session
            .ask("What do cats do?", &backend, &mut handler, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<RemoteError>().unwrap().is_unauthorized());
        assert!(handler.shown.is_empty());
        let turns = session.transcript().all();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role(), Role::Human);
    }

    #[tokio::test]
    async fn switching_documents_clears_transcript() {
        let mut session = Session::new("English");
        session.activate(document("a.txt"));
        let backend = ScriptedBackend::tokens(&["ok"]);
        let mut handler = RecordingHandler::default();
        session
            .ask("q", &backend, &mut handler, &CancellationToken::new())
            .await
            .unwrap();

        session.activate(document("a.txt"));
        assert_eq!(session.transcript().len(), 2);

        session.activate(document("b.txt"));
        assert!(session.transcript().is_empty());

        session
            .ask("q", &backend, &mut handler, &CancellationToken::new())
            .await
            .unwrap();
        session.deactivate();
        assert!(session.transcript().is_empty());
        assert!(session.active().is_none());
    }

    #[tokio::test]
    async fn asking_without_document_fails() {
        let mut session = Session::new("English");
        let backend = ScriptedBackend::tokens(&["ok"]);
        let mut handler = RecordingHandler::default();
        assert!(session
            .ask("q", &backend, &mut handler, &CancellationToken::new())
            .await
            .is_err());
        assert!(session.transcript().is_empty());
    }
}
