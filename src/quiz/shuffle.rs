use rand::seq::SliceRandom;
use rand::Rng;

use crate::quiz;

/// Builds a question out of its correct and incorrect answers, in random
/// order so the correct one isn't always in the same place.
pub fn shuffled_question<R: Rng + ?Sized>(
    text: String,
    correct: String,
    incorrect: Vec<String>,
    rng: &mut R,
) -> quiz::Question {
    let mut answers = incorrect
        .into_iter()
        .map(|text| quiz::Answer::new(text, false))
        .collect::<Vec<_>>();
    answers.push(quiz::Answer::new(correct, true));
    answers.shuffle(rng);

    quiz::Question::new(text, answers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn build(rng: &mut StdRng) -> quiz::Question {
        shuffled_question(
            "Capital of France?".to_string(),
            "Paris".to_string(),
            vec!["Rome".to_string(), "Berlin".to_string(), "Madrid".to_string()],
            rng,
        )
    }

    #[test]
    fn keeps_every_answer_exactly_once() {
        let mut rng = StdRng::seed_from_u64(7);
        let question = build(&mut rng);

        assert_eq!(question.answers.len(), 4);
        let texts = question
            .answers
            .iter()
            .map(|a| a.text.as_str())
            .collect::<HashSet<_>>();
        assert_eq!(texts.len(), 4);
        assert_eq!(question.correct_answer().unwrap().text, "Paris");
        assert_eq!(question.answers.iter().filter(|a| a.is_correct).count(), 1);
    }

    #[test]
    fn correct_position_moves_between_calls() {
        let mut rng = StdRng::seed_from_u64(42);
        let positions = (0..200)
            .map(|_| build(&mut rng).correct_index().unwrap())
            .collect::<HashSet<_>>();

        // 200 draws over 4 slots; every slot should show up.
        assert_eq!(positions.len(), 4);
    }
}
