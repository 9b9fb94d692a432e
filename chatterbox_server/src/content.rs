// Canned responses for `/joke` and `/picture`.
//
// The server treats this text as opaque: the command processor asks for a joke
// or the picture and queues whatever it gets. Every entry ends with a newline
// because replies are rendered verbatim.

use rand::seq::SliceRandom;

const JOKES: &[&str] = &[
    "Most people believe that if it ain't broke, don't fix it. Engineers believe that if it ain't broke, it doesn't have enough features yet.\n",
    "Q: How does a computer tell you it needs more memory?   A: It says ''byte me''\n",
    "Q: What is the first programming language you learn when studying computer science?  A: Profanity\n",
    "A blind man walks into a bar...   and a chair and a table.\n",
    "Q: Why don't cows make large bets?   A: The steaks are too high.\n",
    "Q: Why aren't jokes in base 8 funny?   A: Because 7, 10, 11.\n",
    "Q: What did people say after two satellite dishes got married?   A: The wedding was dull, but the reception was great.\n",
    "Q: If Al Gore tried his hand as a musician, what would his album be called?   A. Algorithms.\n",
    "A programmer goes to do groceries. His wife tells him: \n-- Buy a loaf of bread, and if they have eggs, buy a dozen.\n He comes back with thirteen loaves of bread.\n -- 'But why?', she asks.\n --'They had eggs.'\n",
    "Silly chat person, NO JOKE FOR YOU!\n",
];

const PICTURE: &str = r#"#############################################################
#                    _                                      #
#                  -=\`\                                    #
#              |\ ____\_\__                                 #
#            -=\c`""""""" "`)                               #
#               `~~~~~/ /~~`                                #
#                 -==/ /                                    #
#                   '-'                                     #
#                  _  _                                     #
#                 ( `   )_                                  #
#                (    )    `)                               #
#              (_   (_ .  _) _)                             #
#                                             _             #
#                                            (  )           #
#             _ .                         ( `  ) . )        #
#           (  _ )_                      (_, _(  ,_)_)      #
#         (_  _(_ ,)                                        #
#############################################################
"#;

/// Source of server-chosen reply content.
pub struct CannedContent {
    jokes: Vec<String>,
    picture: String,
}

impl Default for CannedContent {
    fn default() -> Self {
        Self {
            jokes: JOKES.iter().map(|j| (*j).to_owned()).collect(),
            picture: PICTURE.to_owned(),
        }
    }
}

impl CannedContent {
    /// Content with caller-supplied jokes and picture (tests, embedding).
    pub fn new(jokes: Vec<String>, picture: String) -> Self {
        Self { jokes, picture }
    }

    /// A uniformly chosen joke. An empty joke list yields the refusal line.
    pub fn joke(&self) -> String {
        self.jokes
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| "Silly chat person, NO JOKE FOR YOU!\n".to_owned())
    }

    pub fn picture(&self) -> String {
        self.picture.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_jokes_end_with_newline() {
        let content = CannedContent::default();
        for _ in 0..50 {
            let joke = content.joke();
            assert!(joke.ends_with('\n'));
            assert!(JOKES.contains(&joke.as_str()));
        }
    }

    #[test]
    fn picture_is_framed_block() {
        let picture = CannedContent::default().picture();
        assert!(picture.starts_with('#'));
        assert!(picture.ends_with("#\n"));
        assert!(picture.lines().all(|line| line.len() == 61));
    }

    #[test]
    fn custom_content() {
        let content = CannedContent::new(vec!["only one\n".into()], "pic\n".into());
        assert_eq!(content.joke(), "only one\n");
        assert_eq!(content.picture(), "pic\n");
    }

    #[test]
    fn empty_joke_list_refuses() {
        let content = CannedContent::new(Vec::new(), String::new());
        assert_eq!(content.joke(), "Silly chat person, NO JOKE FOR YOU!\n");
    }
}
