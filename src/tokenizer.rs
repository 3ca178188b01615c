use std::{fs, path::Path};

use ndarray::Array2;
use tokenizers::{
    models::{
        wordlevel::{WordLevel, WordLevelTrainer},
        TrainerWrapper,
    },
    normalizers::Lowercase,
    pre_tokenizers::whitespace::Whitespace,
    processors::template::TemplateProcessing,
    AddedToken, PaddingParams, PaddingStrategy, TruncationParams,
};

use crate::{CleanerError, Result};

pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;
pub const CLS_ID: u32 = 2;
pub const SEP_ID: u32 = 3;

const PAD: &str = "[PAD]";
const UNK: &str = "[UNK]";
const CLS: &str = "[CLS]";
const SEP: &str = "[SEP]";

/// Special tokens, in id order.
const SPECIAL_TOKENS: [&str; 4] = [PAD, UNK, CLS, SEP];

const FILE_NAME: &str = "tokenizer.json";

/// The tensors fed to the encoder for a batch of lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoding {
    pub input_ids: Array2<u32>,
    pub token_type_ids: Array2<u32>,
    pub attention_mask: Array2<u32>,
}

impl Encoding {
    /// Number of lines in the batch.
    pub fn batch_size(&self) -> usize {
        self.input_ids.nrows()
    }

    /// Padded sequence length.
    pub fn seq_len(&self) -> usize {
        self.input_ids.ncols()
    }
}

/// Lower-cased word-level tokenizer framing each line as `[CLS] words.. [SEP]`.
///
/// Words are split on whitespace and punctuation; anything outside the
/// trained vocabulary maps to `[UNK]`.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    inner: tokenizers::Tokenizer,
}

impl Tokenizer {
    /// A tokenizer knowing only the special tokens.
    ///
    /// # Errors
    /// `ShapeMismatch` if `max_len` can't hold the `[CLS]`/`[SEP]` framing.
    pub fn new(max_len: usize) -> Result<Self> {
        Self::train::<&str>(&[], SPECIAL_TOKENS.len(), max_len)
    }

    /// Trains a word-level vocabulary on `corpus`.
    ///
    /// # Arguments
    /// * `corpus` - Lines to count words over.
    /// * `vocab_size` - Maximum number of ids, special tokens included.
    /// * `max_len` - Maximum encoded length of a line, `[CLS]` and `[SEP]` included.
    ///
    /// # Errors
    /// `ShapeMismatch` if `vocab_size` can't hold the special tokens or
    /// `max_len` the framing; `Tokenizer` if training fails.
    pub fn train<S: AsRef<str> + Sync>(
        corpus: &[S],
        vocab_size: usize,
        max_len: usize,
    ) -> Result<Self> {
        if vocab_size < SPECIAL_TOKENS.len() {
            return Err(CleanerError::ShapeMismatch {
                what: "vocab_size",
                got: vocab_size,
                expected: SPECIAL_TOKENS.len(),
            });
        }
        if max_len < 2 {
            return Err(CleanerError::ShapeMismatch {
                what: "max_len",
                got: max_len,
                expected: 2,
            });
        }

        let model = WordLevel::builder()
            .unk_token(UNK.to_string())
            .build()
            .map_err(tokenizer_err)?;

        let mut inner = tokenizers::Tokenizer::new(model);
        inner.with_normalizer(Some(Lowercase));
        inner.with_pre_tokenizer(Some(Whitespace::default()));

        let specials: Vec<_> = SPECIAL_TOKENS
            .iter()
            .map(|t| AddedToken::from(t.to_string(), true))
            .collect();
        let mut trainer: TrainerWrapper = WordLevelTrainer::builder()
            .vocab_size(vocab_size)
            .min_frequency(0)
            .show_progress(false)
            .special_tokens(specials)
            .build()
            .map_err(|e| CleanerError::Tokenizer(e.to_string()))?
            .into();

        inner
            .train(&mut trainer, corpus.iter().map(|line| line.as_ref()))
            .map_err(tokenizer_err)?;

        let template = TemplateProcessing::builder()
            .try_single("[CLS] $A [SEP]")
            .map_err(CleanerError::Tokenizer)?
            .special_tokens(vec![(CLS, CLS_ID), (SEP, SEP_ID)])
            .build()
            .map_err(|e| CleanerError::Tokenizer(e.to_string()))?;
        inner.with_post_processor(Some(template));

        inner.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            pad_id: PAD_ID,
            pad_token: PAD.to_string(),
            ..Default::default()
        }));
        inner
            .with_truncation(Some(TruncationParams {
                max_length: max_len,
                ..Default::default()
            }))
            .map_err(tokenizer_err)?;

        log::debug!(
            "trained tokenizer on {} lines, {} ids",
            corpus.len(),
            vocab_len(&inner)
        );
        Ok(Self { inner })
    }

    /// Number of ids the tokenizer can emit.
    pub fn vocab_size(&self) -> usize {
        vocab_len(&self.inner)
    }

    pub fn max_len(&self) -> usize {
        self.inner.get_truncation().map_or(0, |t| t.max_length)
    }

    /// The id of a single token, if it is in the vocabulary.
    pub fn token_id(&self, token: &str) -> Option<u32> {
        self.inner.token_to_id(token)
    }

    /// Encodes a single line as `[CLS] tokens.. [SEP]`, truncated to `max_len`.
    pub fn encode(&self, line: &str) -> Result<Vec<u32>> {
        let encoding = self.inner.encode(line, true).map_err(tokenizer_err)?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Encodes a batch of lines, padding them to the longest one.
    pub fn encode_batch<S: AsRef<str>>(&self, lines: &[S]) -> Result<Encoding> {
        let inputs: Vec<&str> = lines.iter().map(|l| l.as_ref()).collect();
        let encoded = self
            .inner
            .encode_batch(inputs, true)
            .map_err(tokenizer_err)?;

        let seq_len = encoded.iter().map(|e| e.len()).max().unwrap_or(0);
        let shape = (encoded.len(), seq_len);
        let mut input_ids = Array2::from_elem(shape, PAD_ID);
        let mut token_type_ids = Array2::zeros(shape);
        let mut attention_mask = Array2::zeros(shape);

        for (row, encoding) in encoded.iter().enumerate() {
            let columns = encoding
                .get_ids()
                .iter()
                .zip(encoding.get_type_ids())
                .zip(encoding.get_attention_mask());
            for (col, ((&id, &type_id), &mask)) in columns.enumerate() {
                input_ids[[row, col]] = id;
                token_type_ids[[row, col]] = type_id;
                attention_mask[[row, col]] = mask;
            }
        }

        Ok(Encoding {
            input_ids,
            token_type_ids,
            attention_mask,
        })
    }

    /// Writes the tokenizer to `dir/tokenizer.json`, creating `dir` if needed.
    pub fn save_pretrained(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        self.inner
            .save(dir.join(FILE_NAME), true)
            .map_err(tokenizer_err)
    }

    /// Reads a tokenizer written by [`Tokenizer::save_pretrained`].
    pub fn from_pretrained(dir: &Path) -> Result<Self> {
        let path = dir.join(FILE_NAME);
        if !path.is_file() {
            return Err(CleanerError::ModelNotFound(path));
        }

        let inner = tokenizers::Tokenizer::from_file(&path).map_err(tokenizer_err)?;
        Ok(Self { inner })
    }
}

fn vocab_len(tokenizer: &tokenizers::Tokenizer) -> usize {
    tokenizer
        .get_vocab(true)
        .values()
        .max()
        .map_or(0, |&id| id as usize + 1)
}

fn tokenizer_err(e: tokenizers::Error) -> CleanerError {
    CleanerError::Tokenizer(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: [&str; 4] = [
        "Hi Bob, see you at 5pm!",
        "hi Alice",
        "Best regards",
        "See you soon",
    ];

    #[test]
    fn special_tokens_keep_their_ids() {
        let tokenizer = Tokenizer::train(&CORPUS, 100, 16).unwrap();
        for (id, token) in SPECIAL_TOKENS.iter().enumerate() {
            assert_eq!(tokenizer.token_id(token), Some(id as u32));
        }
    }

    #[test]
    fn trained_words_are_lowercased_and_unknown_words_are_unk() {
        let tokenizer = Tokenizer::train(&CORPUS, 100, 16).unwrap();

        let upper = tokenizer.encode("Hi").unwrap();
        let lower = tokenizer.encode("hi").unwrap();
        assert_eq!(upper, lower);
        assert_ne!(upper[1], UNK_ID);

        let unknown = tokenizer.encode("zebra").unwrap();
        assert_eq!(unknown, vec![CLS_ID, UNK_ID, SEP_ID]);
    }

    #[test]
    fn vocab_is_capped() {
        let tokenizer = Tokenizer::train(&CORPUS, 6, 16).unwrap();
        assert_eq!(tokenizer.vocab_size(), 6);

        let untrained = Tokenizer::new(16).unwrap();
        assert_eq!(untrained.vocab_size(), SPECIAL_TOKENS.len());
    }

    #[test]
    fn batch_is_padded_and_masked() {
        let tokenizer = Tokenizer::new(16).unwrap();
        let encoding = tokenizer.encode_batch(&["one two three", ""]).unwrap();

        assert_eq!(encoding.batch_size(), 2);
        assert_eq!(encoding.seq_len(), 5);
        assert_eq!(encoding.input_ids[[0, 1]], UNK_ID);
        assert_eq!(encoding.input_ids[[1, 0]], CLS_ID);
        assert_eq!(encoding.input_ids[[1, 1]], SEP_ID);
        assert_eq!(encoding.input_ids[[1, 2]], PAD_ID);
        assert_eq!(encoding.attention_mask.row(0).sum(), 5);
        assert_eq!(encoding.attention_mask.row(1).sum(), 2);
    }

    #[test]
    fn long_lines_are_truncated() {
        let tokenizer = Tokenizer::new(4).unwrap();
        let ids = tokenizer.encode("a b c d e f").unwrap();
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[3], SEP_ID);
    }

    #[test]
    fn save_and_load_keep_vocab_and_settings() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = Tokenizer::train(&CORPUS, 100, 12).unwrap();
        tokenizer.save_pretrained(dir.path()).unwrap();
        assert!(dir.path().join(FILE_NAME).is_file());

        let loaded = Tokenizer::from_pretrained(dir.path()).unwrap();
        assert_eq!(loaded.vocab_size(), tokenizer.vocab_size());
        assert_eq!(loaded.max_len(), 12);
        assert_eq!(
            loaded.encode_batch(&CORPUS).unwrap(),
            tokenizer.encode_batch(&CORPUS).unwrap()
        );
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Tokenizer::from_pretrained(dir.path()),
            Err(CleanerError::ModelNotFound(_))
        ));
    }

    #[test]
    fn undersized_settings_are_rejected() {
        assert!(Tokenizer::train(&CORPUS, 3, 16).is_err());
        assert!(Tokenizer::new(1).is_err());
    }
}
