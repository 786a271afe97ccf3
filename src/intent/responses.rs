use rand::seq::SliceRandom;
use rand::Rng;

/// Fixed set of interchangeable replies with selection weights
#[derive(Debug, Clone, Copy)]
pub struct ResponsePool {
    entries: &'static [(&'static str, u32)],
}

impl ResponsePool {
    /// Wraps a static table of `(reply, weight)`
    #[must_use]
    pub const fn new(entries: &'static [(&'static str, u32)]) -> Self {
        Self { entries }
    }

    /// Picks a reply at random according to the weights
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &'static str {
        self.entries
            .choose_weighted(rng, |&(_, weight)| weight)
            .map(|&(reply, _)| reply)
            .unwrap_or_else(|_| self.entries.first().map_or("", |&(reply, _)| reply))
    }

    /// Every reply in the pool
    pub fn replies(&self) -> impl Iterator<Item = &'static str> {
        self.entries.iter().map(|&(reply, _)| reply)
    }

    /// True if `reply` belongs to this pool
    #[must_use]
    pub fn contains(&self, reply: &str) -> bool {
        self.replies().any(|candidate| candidate == reply)
    }
}

/// Replies to a greeting
pub const GREETINGS: ResponsePool = ResponsePool::new(&[
    ("Hello! How can I help you today?", 1),
    ("Hi there! What can I do for you?", 1),
    ("Hey! I'm here to assist you.", 1),
    ("Good to hear from you! How may I help?", 1),
    ("Hello! Ready to help with whatever you need.", 1),
]);

/// Replies to "how are you"
pub const STATUS: ResponsePool = ResponsePool::new(&[
    ("I'm doing great, thank you for asking! How are you?", 1),
    ("I'm functioning perfectly and ready to help!", 1),
    ("All systems running smoothly! How can I assist you today?", 1),
    ("I'm excellent, thanks! What would you like me to do?", 1),
]);

/// Replies to thanks
pub const ACKNOWLEDGMENTS: ResponsePool = ResponsePool::new(&[
    ("You're very welcome!", 1),
    ("Happy to help!", 1),
    ("My pleasure!", 1),
    ("Anytime! That's what I'm here for.", 1),
]);

/// Replies when the session ends
pub const FAREWELLS: ResponsePool = ResponsePool::new(&[
    ("Goodbye! Have a great day!", 1),
    ("See you later! Take care!", 1),
    ("Bye! It was nice talking with you!", 1),
    ("Until next time! Have a wonderful day!", 1),
]);

/// Replies to anything unclassified
pub const CONVERSATIONAL: ResponsePool = ResponsePool::new(&[
    ("That's interesting! Is there anything specific I can help you with?", 1),
    ("I understand. How can I assist you today?", 1),
    ("Thanks for sharing that with me. What would you like me to do?", 1),
    ("I hear you! Is there a task I can help you with?", 1),
    ("That's nice to know. What can I do for you right now?", 1),
]);

/// Capability summary for the help intent
pub const HELP_TEXT: &str = "I can help you with many things! Here are some examples: \
open applications like YouTube, WhatsApp, Calculator and Gmail; \
tell you the current time and date; \
search Google for information; \
open websites like Facebook, Instagram and Twitter; \
play music on Spotify or YouTube Music; \
check weather and news; \
and have friendly conversations with you. \
Just speak naturally and I'll do my best to help!";
