use crate::global::token_codes::TermCode;
use logos::{Lexer, Logos};

/// Raw lexemes, produced one statement ahead of the parser. Classification of
/// identifiers (keyword, function, variable, generic name) is the parser's
/// job; the lexer only separates the lexical classes.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*[^*]*\*+([^*/][^*]*\*+)*/")]
#[rustfmt::skip]
pub enum RawToken {
    // ==< Terminals: separators and operators >==
    #[token(";",   |_| TermCode::Semicolon)]
    #[token(",",   |_| TermCode::Comma)]
    #[token("(",   |_| TermCode::LeftPar)]
    #[token(")",   |_| TermCode::RightPar)]
    #[token("=",   |_| TermCode::Assign)]
    #[token("+=",  |_| TermCode::PlusAssign)]
    #[token("-=",  |_| TermCode::MinusAssign)]
    #[token("*=",  |_| TermCode::MultAssign)]
    #[token("/=",  |_| TermCode::DivAssign)]
    #[token("%=",  |_| TermCode::ModAssign)]
    #[token("&=",  |_| TermCode::BitAndAssign)]
    #[token("|=",  |_| TermCode::BitOrAssign)]
    #[token("^=",  |_| TermCode::BitXorAssign)]
    #[token("<<=", |_| TermCode::BitShLeftAssign)]
    #[token(">>=", |_| TermCode::BitShRightAssign)]
    #[token("<",   |_| TermCode::Lt)]
    #[token(">",   |_| TermCode::Gt)]
    #[token("<=",  |_| TermCode::LtoE)]
    #[token(">=",  |_| TermCode::GtoE)]
    #[token("!=",  |_| TermCode::Ne)]
    #[token("==",  |_| TermCode::Eq)]
    #[token("+",   |_| TermCode::Plus)]
    #[token("-",   |_| TermCode::Minus)]
    #[token("*",   |_| TermCode::Mult)]
    #[token("/",   |_| TermCode::Div)]
    #[token("%",   |_| TermCode::Mod)]
    #[token("**",  |_| TermCode::Pow)]
    #[token("++",  |_| TermCode::Incr)]
    #[token("--",  |_| TermCode::Decr)]
    #[token("&&",  |_| TermCode::And)]
    #[token("||",  |_| TermCode::Or)]
    #[token("!",   |_| TermCode::Not)]
    #[token("~",   |_| TermCode::BitCompl)]
    #[token("<<",  |_| TermCode::BitShLeft)]
    #[token(">>",  |_| TermCode::BitShRight)]
    #[token("&",   |_| TermCode::BitAnd)]
    #[token("|",   |_| TermCode::BitOr)]
    #[token("^",   |_| TermCode::BitXor)]
    Terminal(TermCode),

    // ==< Value literals >==
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", allocated_string)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", allocated_string)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", allocated_string)]
    FloatLiteral(String),

    #[regex(r"0[xX][0-9a-fA-F]+", allocated_string)]
    HexLiteral(String),

    #[regex(r"0[bB][01]+", allocated_string)]
    BinLiteral(String),

    #[regex(r"[0-9]+", allocated_string)]
    IntLiteral(String),

    // escape validation happens in the parser (only \\ and \" are legal)
    #[regex(r#""([^"\\\n\r]|\\.)*""#, allocated_string)]
    StringLiteral(String),

    // ==< Identifiers: letter, then letters, digits, underscores >==
    #[regex(r"[a-zA-Z][a-zA-Z0-9_]*", allocated_string)]
    Identifier(String),
}

#[inline(always)]
fn allocated_string(lex: &mut Lexer<RawToken>) -> String {
    lex.slice().to_owned()
}

/// One lexed unit: the token (or a lexical error) plus its source span.
pub type Lexeme = (Result<RawToken, ()>, core::ops::Range<usize>);

/// Lexes a complete source fragment. Lexical errors are kept in place so the
/// parser can report them at the position where parsing arrives.
pub fn lex(source: &str) -> Vec<Lexeme> {
    RawToken::lexer(source).spanned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_tokens(src: &str) -> Vec<RawToken> {
        lex(src).into_iter().map(|(t, _)| t.unwrap()).collect()
    }

    #[test]
    fn longest_match_wins() {
        assert_eq!(
            ok_tokens("a**=b"),
            vec![
                RawToken::Identifier("a".into()),
                RawToken::Terminal(TermCode::Pow),
                RawToken::Terminal(TermCode::Assign),
                RawToken::Identifier("b".into()),
            ]
        );
        assert_eq!(ok_tokens("<<=")[0], RawToken::Terminal(TermCode::BitShLeftAssign));
    }

    #[test]
    fn numeric_classes() {
        assert_eq!(ok_tokens("0x1F")[0], RawToken::HexLiteral("0x1F".into()));
        assert_eq!(ok_tokens("0b101")[0], RawToken::BinLiteral("0b101".into()));
        assert_eq!(ok_tokens("12.5e-3")[0], RawToken::FloatLiteral("12.5e-3".into()));
        assert_eq!(ok_tokens("42")[0], RawToken::IntLiteral("42".into()));
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(ok_tokens("1 // comment\n+ /* mid */ 2").len(), 3);
    }

    #[test]
    fn unknown_character_is_an_error() {
        let lexed = lex("a @ b");
        assert!(lexed[1].0.is_err());
    }
}
