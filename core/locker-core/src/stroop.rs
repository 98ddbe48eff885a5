//! Stroop colour-naming puzzles.
//!
//! The word names one colour and is drawn in a different ink colour; the
//! correct answer is the ink. Answer buttons are labelled with colour names
//! whose own text colours never match their labels.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StroopColor {
    pub name: &'static str,
    pub hex: &'static str,
}

pub const PALETTE: [StroopColor; 9] = [
    StroopColor { name: "Red", hex: "#FF0000" },
    StroopColor { name: "Green", hex: "#00FF00" },
    StroopColor { name: "Blue", hex: "#3366FF" },
    StroopColor { name: "Yellow", hex: "#CCFF33" },
    StroopColor { name: "Pink", hex: "#FF66FF" },
    StroopColor { name: "Orange", hex: "#FF6600" },
    StroopColor { name: "Brown", hex: "#FF8000" },
    StroopColor { name: "Cyan", hex: "#00FFFF" },
    StroopColor { name: "Purple", hex: "#8A00E6" },
];

const MAX_OPTIONS: usize = 9;

pub fn color_by_name(name: &str) -> Option<&'static StroopColor> {
    PALETTE
        .iter()
        .find(|color| color.name.eq_ignore_ascii_case(name.trim()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub label: String,
    pub text_color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StroopPuzzle {
    pub word: String,
    pub ink: String,
    pub ink_hex: String,
    pub options: Vec<AnswerOption>,
    pub expected_answer: String,
}

impl StroopPuzzle {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let word = PALETTE.choose(rng).copied().unwrap_or(PALETTE[0]);
        let ink = loop {
            let candidate = PALETTE.choose(rng).copied().unwrap_or(PALETTE[1]);
            if candidate.name != word.name {
                break candidate;
            }
        };

        let mut labels: Vec<&'static str> = PALETTE.iter().map(|color| color.name).collect();
        labels.shuffle(rng);
        labels.truncate(MAX_OPTIONS);
        if !labels.contains(&ink.name) {
            labels[0] = ink.name;
            labels.shuffle(rng);
        }

        // Rotate by one so no label is drawn in its own colour.
        let mut text_colors = labels.clone();
        if text_colors.len() > 1 {
            text_colors.rotate_left(1);
        }

        let options = labels
            .iter()
            .zip(text_colors.iter())
            .map(|(label, text_color)| AnswerOption {
                label: label.to_string(),
                text_color: text_color.to_string(),
            })
            .collect();

        StroopPuzzle {
            word: word.name.to_string(),
            ink: ink.name.to_string(),
            ink_hex: ink.hex.to_string(),
            options,
            expected_answer: ink.name.to_string(),
        }
    }

    /// Case-insensitive, surrounding whitespace ignored.
    pub fn check(&self, selected_color: &str) -> bool {
        self.expected_answer
            .eq_ignore_ascii_case(selected_color.trim())
    }
}

/// Where the coordinator gets a fresh puzzle for each challenge round.
pub trait PuzzleSource: Send + Sync {
    fn next_puzzle(&self) -> StroopPuzzle;
}

pub struct StroopGenerator {
    rng: Mutex<StdRng>,
}

impl StroopGenerator {
    pub fn new() -> Self {
        StroopGenerator {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        StroopGenerator {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for StroopGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PuzzleSource for StroopGenerator {
    fn next_puzzle(&self) -> StroopPuzzle {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        StroopPuzzle::generate(&mut *rng)
    }
}
