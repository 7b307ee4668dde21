use crate::error::{Error, Result};
use crate::models::question::QuestionRef;
use rand::seq::SliceRandom;
use std::collections::HashSet;

pub const MIN_QUESTIONS: usize = 1;
pub const MAX_QUESTIONS: usize = 60;
pub const SECONDS_PER_QUESTION: i64 = 60;

/// One minute per question, fixed ratio.
pub fn duration_for(total: usize) -> i64 {
    total as i64 * SECONDS_PER_QUESTION
}

pub fn clamp_total(requested: usize) -> usize {
    requested.clamp(MIN_QUESTIONS, MAX_QUESTIONS)
}

/// Draws `desired_total` questions from the pool, preferring questions
/// the candidate has never seen. Only when the unseen pool runs short is
/// the remainder backfilled from previously seen questions. The final
/// order is shuffled independently of sampling order so the list never
/// leaks section sequence.
pub fn select_questions(
    pool: &[QuestionRef],
    history: &HashSet<QuestionRef>,
    desired_total: usize,
) -> Result<Vec<QuestionRef>> {
    if pool.len() < desired_total {
        return Err(Error::InsufficientPool(format!(
            "Question pool holds {} questions, {} requested",
            pool.len(),
            desired_total
        )));
    }

    let mut rng = rand::thread_rng();
    let unseen: Vec<&QuestionRef> = pool.iter().filter(|r| !history.contains(r)).collect();

    let mut selected: Vec<QuestionRef> = if unseen.len() >= desired_total {
        unseen
            .choose_multiple(&mut rng, desired_total)
            .map(|r| (*r).clone())
            .collect()
    } else {
        let mut chosen: Vec<QuestionRef> = unseen.iter().map(|r| (*r).clone()).collect();
        let chosen_set: HashSet<&QuestionRef> = unseen.into_iter().collect();
        let remainder: Vec<&QuestionRef> =
            pool.iter().filter(|r| !chosen_set.contains(r)).collect();
        let needed = desired_total - chosen.len();
        chosen.extend(
            remainder
                .choose_multiple(&mut rng, needed)
                .map(|r| (*r).clone()),
        );
        chosen
    };

    if selected.len() < desired_total {
        return Err(Error::InsufficientPool(format!(
            "Only {} distinct questions available, {} requested",
            selected.len(),
            desired_total
        )));
    }

    selected.shuffle(&mut rng);
    Ok(selected)
}
