//! Passages and the ordered corpus they live in
//!
//! A corpus is built once from raw curriculum text. Passage ids are assigned
//! by position (zero-based) and double as positions in the vector index.

use serde::{Deserialize, Serialize};

/// One retrievable unit of curriculum text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub id: usize,
    pub text: String,
}

/// Ordered collection of passages, indexed by id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corpus {
    passages: Vec<Passage>,
}

impl Corpus {
    /// Segment raw document text into passages.
    ///
    /// A header line (after trimming: only ASCII uppercase letters and spaces)
    /// starts a new passage and is kept as that passage's first line. Lines
    /// before the first header form a passage of their own. Blank lines are
    /// skipped and the remaining lines of a passage are joined with one space.
    ///
    /// A header directly followed by another header still yields a passage
    /// holding just the header line. Empty input yields an empty corpus.
    ///
    /// # Example
    ///
    /// ```
    /// use retrieval_core::Corpus;
    ///
    /// let corpus = Corpus::segment("TOPIC ONE\nbody line\nTOPIC TWO\nbody line 2");
    /// assert_eq!(corpus.len(), 2);
    /// assert_eq!(corpus.get(0).unwrap().text, "TOPIC ONE body line");
    /// assert_eq!(corpus.get(1).unwrap().text, "TOPIC TWO body line 2");
    /// ```
    pub fn segment(raw: &str) -> Self {
        let mut groups: Vec<String> = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in raw.lines().map(str::trim) {
            if line.is_empty() {
                continue;
            }
            if is_header(line) && !current.is_empty() {
                groups.push(current.join(" "));
                current.clear();
            }
            current.push(line);
        }

        // Flush the trailing group, which has no header after it
        if !current.is_empty() {
            groups.push(current.join(" "));
        }

        Self::from_texts(groups)
    }

    /// Build a corpus from texts in order, assigning ids by position
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let passages = texts
            .into_iter()
            .enumerate()
            .map(|(id, text)| Passage {
                id,
                text: text.into(),
            })
            .collect();
        Self { passages }
    }

    /// Rebuild a corpus from persisted passages.
    ///
    /// Returns `None` unless the ids are exactly `0..len` in order.
    pub fn from_passages(passages: Vec<Passage>) -> Option<Self> {
        let aligned = passages.iter().enumerate().all(|(pos, p)| p.id == pos);
        aligned.then_some(Self { passages })
    }

    pub fn get(&self, id: usize) -> Option<&Passage> {
        self.passages.get(id)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    /// Passage texts in id order (the batch handed to the embedder)
    pub fn texts(&self) -> Vec<String> {
        self.passages.iter().map(|p| p.text.clone()).collect()
    }
}

/// A topic header: non-empty, uppercase ASCII letters and spaces only
fn is_header(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c.is_ascii_uppercase() || c == ' ')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_two_topics() {
        let corpus = Corpus::segment("TOPIC ONE\nbody line\nTOPIC TWO\nbody line 2");
        assert_eq!(
            corpus.passages(),
            &[
                Passage { id: 0, text: "TOPIC ONE body line".to_string() },
                Passage { id: 1, text: "TOPIC TWO body line 2".to_string() },
            ]
        );
    }

    #[test]
    fn test_empty_input_is_empty_corpus() {
        assert!(Corpus::segment("").is_empty());
        assert!(Corpus::segment("\n\n   \n").is_empty());
    }

    #[test]
    fn test_adjacent_headers_keep_header_only_passage() {
        let corpus = Corpus::segment("PLANTS\nANIMALS\nCats are mammals.");
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.get(0).unwrap().text, "PLANTS");
        assert_eq!(corpus.get(1).unwrap().text, "ANIMALS Cats are mammals.");
    }

    #[test]
    fn test_preamble_before_first_header() {
        let corpus = Corpus::segment("Grade 6 notes\nTHE CELL\nCells are small.");
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.get(0).unwrap().text, "Grade 6 notes");
        assert_eq!(corpus.get(1).unwrap().text, "THE CELL Cells are small.");
    }

    #[test]
    fn test_lines_are_trimmed_and_blank_lines_skipped() {
        let corpus = Corpus::segment("  MATTER  \n\n  Solids keep shape. \r\n\tLiquids flow.\n");
        assert_eq!(corpus.len(), 1);
        assert_eq!(
            corpus.get(0).unwrap().text,
            "MATTER Solids keep shape. Liquids flow."
        );
    }

    #[test]
    fn test_header_detection() {
        assert!(is_header("HUMAN BODY"));
        assert!(is_header("A"));
        assert!(!is_header("Human body"));
        assert!(!is_header("TOPIC 1"));
        assert!(!is_header("WATER-CYCLE"));
        assert!(!is_header(""));
    }

    #[test]
    fn test_ids_are_positions() {
        let corpus = Corpus::from_texts(["a", "b", "c"]);
        for (pos, passage) in corpus.passages().iter().enumerate() {
            assert_eq!(passage.id, pos);
        }
    }

    #[test]
    fn test_from_passages_rejects_gaps() {
        let good = vec![
            Passage { id: 0, text: "a".into() },
            Passage { id: 1, text: "b".into() },
        ];
        assert!(Corpus::from_passages(good).is_some());

        let gap = vec![
            Passage { id: 0, text: "a".into() },
            Passage { id: 2, text: "b".into() },
        ];
        assert!(Corpus::from_passages(gap).is_none());
    }
}
