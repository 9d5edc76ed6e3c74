//! Lexer and parser for the process-term language.
//!
//! The grammar, lowest precedence first:
//!
//! ```text
//! parallel := choice ('||' choice)*
//! choice   := seq ('o+' seq)*
//! seq      := atom (';' seq)?
//! atom     := 'bot' | '"' policy '"' | chan '!' '"' policy '"'
//!           | chan '?' '"' policy '"' | ident | '(' choice ')'
//!           | 'sw(' ident ',' '[' policies ']' ',' ('none' | 'wait(' int ')') ')'
//! ```

use logos::Logos;

use crate::term::{SwitchState, Term};
use crate::EngineError;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum Token {
    #[token("o+")]
    OPlus,
    #[token("||")]
    Par,
    #[token("!")]
    Bang,
    #[token("?")]
    Question,
    #[token(";")]
    Semi,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[regex("[0-9]+")]
    Int,
    #[regex(r#""[^"]*""#)]
    Str,
    #[regex("[A-Za-z](-?[A-Za-z0-9])*")]
    Ident,
}

/// Parses a full parallel composition, one term per element.
pub fn parse_parallel(src: &str) -> crate::Result<Vec<Term>> {
    let mut parser = Parser::new(src)?;
    let mut elements = vec![parser.choice()?];
    while parser.eat(Token::Par) {
        elements.push(parser.choice()?);
    }
    parser.expect_end()?;
    Ok(elements)
}

/// Parses a single process term.
pub fn parse_term(src: &str) -> crate::Result<Term> {
    let mut parser = Parser::new(src)?;
    let term = parser.choice()?;
    parser.expect_end()?;
    Ok(term)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<(Token, &'a str)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> crate::Result<Self> {
        let mut tokens = Vec::new();
        let mut lexer = Token::lexer(src);
        while let Some(token) = lexer.next() {
            let token = token.map_err(|()| EngineError::Parse {
                expr: src.to_string(),
                message: format!("unexpected character at byte {}", lexer.span().start),
            })?;
            tokens.push((token, lexer.slice()));
        }
        Ok(Self {
            src,
            tokens,
            pos: 0,
        })
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::Parse {
            expr: self.src.to_string(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).map(|(t, _)| *t)
    }

    fn next(&mut self) -> crate::Result<(Token, &'a str)> {
        let tok = self
            .tokens
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.error("unexpected end of expression"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn eat(&mut self, token: Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, token: Token, what: &str) -> crate::Result<&'a str> {
        let (found, slice) = self.next()?;
        if found != token {
            return Err(self.error(format!("expected {what}, found '{slice}'")));
        }
        Ok(slice)
    }

    fn expect_end(&self) -> crate::Result<()> {
        if let Some((_, slice)) = self.tokens.get(self.pos) {
            return Err(self.error(format!("trailing input starting at '{slice}'")));
        }
        Ok(())
    }

    fn choice(&mut self) -> crate::Result<Term> {
        let mut alts = vec![self.seq()?];
        while self.eat(Token::OPlus) {
            alts.push(self.seq()?);
        }
        if alts.len() == 1 {
            return Ok(alts.pop().ok_or_else(|| self.error("empty choice"))?);
        }
        Ok(Term::Choice(alts))
    }

    fn seq(&mut self) -> crate::Result<Term> {
        let first = self.atom()?;
        if self.eat(Token::Semi) {
            let rest = self.seq()?;
            return Ok(Term::seq(first, rest));
        }
        Ok(first)
    }

    fn atom(&mut self) -> crate::Result<Term> {
        let (token, slice) = self.next()?;
        match token {
            Token::Str => Ok(Term::Policy(unquote(slice))),
            Token::LParen => {
                let inner = self.choice()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident if slice == "bot" => Ok(Term::Bot),
            Token::Ident if slice == "sw" && self.peek() == Some(Token::LParen) => self.switch(),
            Token::Ident => match self.peek() {
                Some(Token::Bang) => {
                    self.pos += 1;
                    let policy = self.expect(Token::Str, "quoted policy after '!'")?;
                    Ok(Term::Send {
                        channel: slice.to_string(),
                        policy: unquote(policy),
                    })
                }
                Some(Token::Question) => {
                    self.pos += 1;
                    let policy = self.expect(Token::Str, "quoted policy after '?'")?;
                    Ok(Term::Recv {
                        channel: slice.to_string(),
                        policy: unquote(policy),
                    })
                }
                _ => Ok(Term::Var(slice.to_string())),
            },
            _ => Err(self.error(format!("expected a term, found '{slice}'"))),
        }
    }

    /// `sw(<config>, [<fts>], none | wait(<i>))`, with `sw(` consumed
    /// up to the identifier.
    fn switch(&mut self) -> crate::Result<Term> {
        self.expect(Token::LParen, "'('")?;
        let config = self.expect(Token::Ident, "switch configuration name")?;
        self.expect(Token::Comma, "','")?;
        self.expect(Token::LBracket, "'['")?;
        let mut fts = Vec::new();
        if self.peek() == Some(Token::Str) {
            loop {
                let ft = self.expect(Token::Str, "flow table")?;
                fts.push(unquote(ft));
                if !self.eat(Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RBracket, "']'")?;
        self.expect(Token::Comma, "','")?;
        let mode = self.expect(Token::Ident, "'none' or 'wait'")?;
        let pending = match mode {
            "none" => None,
            "wait" => {
                self.expect(Token::LParen, "'('")?;
                let index = self.expect(Token::Int, "request index")?;
                self.expect(Token::RParen, "')'")?;
                Some(index.parse().map_err(|_| self.error("request index overflow"))?)
            }
            other => return Err(self.error(format!("expected 'none' or 'wait', found '{other}'"))),
        };
        self.expect(Token::RParen, "')'")?;
        Ok(Term::Switch(SwitchState {
            config: config.to_string(),
            fts,
            pending,
        }))
    }
}

fn unquote(slice: &str) -> String {
    slice[1..slice.len() - 1].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(src: &str) {
        let term = parse_term(src).unwrap();
        assert_eq!(term.to_string(), src);
        assert_eq!(parse_term(&term.to_string()).unwrap(), term);
    }

    #[test]
    fn parses_prefix_chains() {
        let term = parse_term("up1 ! \"#0\" ; CT1").unwrap();
        assert_eq!(
            term,
            Term::seq(
                Term::Send {
                    channel: "up1".to_string(),
                    policy: "#0".to_string()
                },
                Term::Var("CT1".to_string())
            )
        );
    }

    #[test]
    fn choice_binds_looser_than_seq() {
        let term = parse_term("\"a\" ; X o+ bot").unwrap();
        assert_eq!(
            term,
            Term::Choice(vec![
                Term::seq(Term::Policy("a".to_string()), Term::Var("X".to_string())),
                Term::Bot,
            ])
        );
    }

    #[test]
    fn parses_parallel_compositions() {
        let elements = parse_parallel("sw(BigSwitch, [\"#0\"], none) || CT1 || CT2").unwrap();
        assert_eq!(elements.len(), 3);
        assert!(matches!(elements[0], Term::Switch(_)));
    }

    #[test]
    fn canonical_forms_round_trip() {
        round_trip("bot");
        round_trip("\"#1\"");
        round_trip("up1 ? \"#0\" ; (\"#1\" o+ bot)");
        round_trip("sw(BigSwitch, [\"#0\", \"#1\"], wait(0))");
        round_trip("(\"a\" o+ \"b\") ; X");
    }

    #[test]
    fn rejects_trailing_input() {
        assert!(parse_term("bot bot").is_err());
    }

    #[test]
    fn rejects_unterminated_switch() {
        assert!(parse_term("sw(BigSwitch, [\"#0\"], none").is_err());
    }
}
