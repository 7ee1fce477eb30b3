use thiserror::Error;

#[derive(Error, Debug)]
pub enum YencError {
    #[error("article has no recognisable yEnc header/trailer")]
    MalformedArticle,
}
