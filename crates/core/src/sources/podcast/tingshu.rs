//! Tingshu audiobook catalogue.
//!
//! Audio URLs live in the play page's `_conf` object, encrypted with the
//! ROT13 + Base64 + ROT13 chain. Episode ids are `{program}_{number}`.

use async_trait::async_trait;
use scraper::Html;
use url::Url;

use crate::config::{FetchConfig, SourceConfig};
use crate::content::html::{absolute_url, first, image_src, select_all, text, text_of};
use crate::content::ids::numeric_prefix;
use crate::content::{
    join_id, normalize_order, split_id, Category, Episode, EpisodeDetail, Listing, Paging,
    Program, Status,
};
use crate::fetch::{FetchSession, RequestOptions, SessionError};
use crate::resolver::{cipher, ResolveError, Stage};
use crate::sources::error::SourceError;
use crate::sources::traits::PodcastSource;
use crate::sources::util::{after_label, checked_slug, has_next_link, last_segment, parse_pairs};

const DEFAULT_CATEGORIES: &str =
    "1:玄幻武侠,2:都市言情,3:恐怖悬疑,4:历史军事,5:相声评书,6:儿童读物,7:有声文学";

/// Stem of a `/book/{id}.html` or `/play/{id}_{n}.html` link.
fn page_stem(href: &str) -> Option<String> {
    let file = last_segment(href)?;
    checked_slug(file.trim_end_matches(".html"))
        .ok()
        .map(str::to_string)
}

pub(crate) fn parse_cards(page: &str, base: &Url) -> (Vec<Program>, bool) {
    let document = Html::parse_document(page);
    let root = document.root_element();

    let programs = select_all(root, "ul.list-works li")
        .into_iter()
        .filter_map(|item| {
            let link = first(item, "h4 a")?;
            let id = page_stem(link.value().attr("href")?)?;
            Some(Program {
                id,
                title: text(link),
                cover: first(item, "a.cover img")
                    .and_then(image_src)
                    .and_then(|u| absolute_url(base, &u))
                    .unwrap_or_default(),
                author: text_of(item, "p.author")
                    .map(|a| after_label(&a))
                    .unwrap_or_default(),
                description: text_of(item, "p.intro").unwrap_or_default(),
                episode_count: text_of(item, "span.count")
                    .and_then(|c| numeric_prefix(&c))
                    .unwrap_or(0) as u32,
                status: text_of(item, "span.status")
                    .map(|s| Status::from_label(&s))
                    .unwrap_or_default(),
            })
        })
        .filter(|p| !p.title.is_empty())
        .collect();

    (programs, has_next_link(root, ".pages a"))
}

pub(crate) fn parse_program(page: &str, base: &Url, program_id: &str) -> Option<(Program, Vec<Episode>)> {
    let document = Html::parse_document(page);
    let root = document.root_element();
    let info = first(root, ".book-info")?;

    let mut author = String::new();
    let mut narrator = String::new();
    let mut status = Status::Unknown;
    for line in select_all(info, "p").into_iter().map(text) {
        if line.starts_with("作者") {
            author = after_label(&line);
        } else if line.starts_with("演播") {
            narrator = after_label(&line);
        } else if line.starts_with("状态") {
            status = Status::from_label(&after_label(&line));
        }
    }

    let mut episodes: Vec<Episode> = select_all(root, "#playlist li a")
        .into_iter()
        .filter_map(|a| {
            let stem = page_stem(a.value().attr("href")?)?;
            let parts = split_id(&stem, 2)?;
            let number: u32 = parts[1].parse().ok()?;
            Some(Episode {
                id: join_id(&[program_id, parts[1]]),
                program_id: program_id.to_string(),
                title: text(a),
                order: number,
                duration: None,
                published_at: None,
            })
        })
        .collect();
    normalize_order(&mut episodes);

    let program = Program {
        id: program_id.to_string(),
        title: text_of(info, "h1")?,
        cover: first(info, "img")
            .and_then(image_src)
            .and_then(|u| absolute_url(base, &u))
            .unwrap_or_default(),
        author: if author.is_empty() { narrator } else { author },
        description: text_of(root, ".book-intro").unwrap_or_default(),
        episode_count: episodes.len() as u32,
        status,
    };
    Some((program, episodes))
}

pub struct Tingshu {
    session: FetchSession,
    categories: Vec<Category>,
}

impl Tingshu {
    pub fn new(source: &SourceConfig, policy: &FetchConfig) -> Result<Self, SessionError> {
        Ok(Self {
            session: FetchSession::new(source, policy)?,
            categories: parse_pairs(source.option("categories").unwrap_or(DEFAULT_CATEGORIES)),
        })
    }

    async fn listing(&self, path: &str, options: RequestOptions, paging: Paging) -> Listing<Program> {
        let Some(url) = self.session.absolute(path) else {
            return Listing::empty(paging);
        };
        match self.session.get_with(&url, &options).await {
            Some(response) => {
                let (programs, has_next) = parse_cards(response.text(), self.session.base_url());
                Listing::from_page(programs, paging, has_next)
            }
            None => Listing::empty(paging),
        }
    }

    async fn program(&self, program_id: &str) -> Result<(Program, Vec<Episode>), SourceError> {
        let program_id = checked_slug(program_id)?;
        let url = self
            .session
            .absolute(&format!("/book/{}.html", program_id))
            .ok_or_else(|| SourceError::bad_id(program_id))?;
        let page = self
            .session
            .get(&url)
            .await
            .ok_or_else(|| SourceError::fetch("program page"))?;
        parse_program(page.text(), self.session.base_url(), program_id)
            .ok_or_else(|| SourceError::NotFound(program_id.to_string()))
    }
}

#[async_trait]
impl PodcastSource for Tingshu {
    fn id(&self) -> &str {
        self.session.source_id()
    }

    async fn categories(&self) -> Vec<Category> {
        self.categories.clone()
    }

    async fn programs(&self, category: &str, paging: Paging) -> Listing<Program> {
        let Ok(category) = checked_slug(category) else {
            return Listing::empty(paging);
        };
        let path = format!("/list/{}_{}.html", category, paging.page);
        self.listing(&path, RequestOptions::new(), paging).await
    }

    async fn hot(&self, paging: Paging) -> Listing<Program> {
        let options = RequestOptions::new().query("page", paging.page);
        self.listing("/top/", options, paging).await
    }

    async fn latest(&self, paging: Paging) -> Listing<Program> {
        let options = RequestOptions::new().query("page", paging.page);
        self.listing("/new/", options, paging).await
    }

    async fn detail(&self, program_id: &str) -> Result<Program, SourceError> {
        Ok(self.program(program_id).await?.0)
    }

    async fn episodes(&self, program_id: &str) -> Result<Vec<Episode>, SourceError> {
        Ok(self.program(program_id).await?.1)
    }

    async fn episode_detail(&self, episode_id: &str) -> Result<EpisodeDetail, SourceError> {
        let parts = split_id(episode_id, 2).ok_or_else(|| SourceError::bad_id(episode_id))?;
        let program = checked_slug(parts[0])?;
        let number: usize = parts[1]
            .parse()
            .map_err(|_| SourceError::bad_id(episode_id))?;

        let url = self
            .session
            .absolute(&format!("/play/{}_{}.html", program, number))
            .ok_or_else(|| SourceError::bad_id(episode_id))?;
        let page = self
            .session
            .get(&url)
            .await
            .ok_or_else(|| SourceError::fetch("play page"))?;

        let table = cipher::decode_conf(page.text())?;
        let (audio_url, backup_url) = table.episode(number).ok_or_else(|| {
            ResolveError::new(
                Stage::Cipher,
                format!("episode {} outside table of {}", number, table.len()),
            )
        })?;
        let title = {
            let document = Html::parse_document(page.text());
            text_of(document.root_element(), "h1").unwrap_or_default()
        };

        Ok(EpisodeDetail {
            id: episode_id.to_string(),
            title,
            audio_url,
            backup_url,
        })
    }

    async fn search(&self, keyword: &str, paging: Paging) -> Listing<Program> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Listing::empty(paging);
        }
        let options = RequestOptions::new()
            .query("q", keyword)
            .query("page", paging.page);
        self.listing("/search.php", options, paging).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Domain;
    use crate::testing::upstream::{fixture, serve, source_row};
    use axum::routing::get;
    use axum::Router;

    fn base() -> Url {
        Url::parse("https://www.tingshu7.com/").unwrap()
    }

    async fn adapter() -> Tingshu {
        let router = Router::new()
            .route("/list/3_1.html", get(|| async { fixture("tingshu_list.html") }))
            .route("/book/3301.html", get(|| async { fixture("tingshu_book.html") }))
            .route("/play/3301_2.html", get(|| async { fixture("tingshu_play.html") }))
            .route("/play/3301_9.html", get(|| async { fixture("tingshu_play.html") }))
            .route("/play/3302_1.html", get(|| async { "<h1>no conf</h1>" }));
        let base = serve(router).await;
        Tingshu::new(
            &source_row("tingshu", Domain::Podcast, &base),
            &FetchConfig::without_delay(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_cards() {
        let (programs, has_next) = parse_cards(&fixture("tingshu_list.html"), &base());
        assert!(has_next);
        assert_eq!(programs.len(), 2);
        assert_eq!(programs[0].id, "3301");
        assert_eq!(programs[0].cover, "https://www.tingshu7.com/uploads/3301.jpg");
        assert_eq!(programs[0].author, "周建龙");
        assert_eq!(programs[0].episode_count, 56);
        assert_eq!(programs[0].status, Status::Completed);
        assert_eq!(programs[1].status, Status::Ongoing);
    }

    #[test]
    fn test_parse_program() {
        let (program, episodes) =
            parse_program(&fixture("tingshu_book.html"), &base(), "3301").unwrap();
        assert_eq!(program.title, "鬼吹灯之精绝古城");
        assert_eq!(program.author, "天下霸唱");
        assert_eq!(program.status, Status::Completed);
        assert_eq!(program.episode_count, 3);
        let ids: Vec<_> = episodes.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["3301_1", "3301_2", "3301_3"]);
    }

    #[tokio::test]
    async fn test_programs_listing() {
        let tingshu = adapter().await;
        let listing = tingshu.programs("3", Paging::default()).await;
        assert_eq!(listing.items.len(), 2);
        assert!(listing.has_more);
        // Unreachable listings degrade to empty.
        assert!(tingshu.hot(Paging::default()).await.items.is_empty());
    }

    #[tokio::test]
    async fn test_episode_detail_decrypts_conf() {
        let tingshu = adapter().await;
        let detail = tingshu.episode_detail("3301_2").await.unwrap();
        assert_eq!(detail.audio_url, "https://audio.example/002.mp3");
        assert_eq!(detail.backup_url.as_deref(), Some("https://backup.example/002.mp3"));
        assert_eq!(detail.title, "鬼吹灯之精绝古城 第002集");
    }

    #[tokio::test]
    async fn test_episode_detail_failures() {
        let tingshu = adapter().await;
        let outside = tingshu.episode_detail("3301_9").await.unwrap_err();
        assert!(matches!(outside, SourceError::Resolve(ref e) if e.stage == Stage::Cipher));
        let no_conf = tingshu.episode_detail("3302_1").await.unwrap_err();
        assert!(matches!(no_conf, SourceError::Resolve(_)));
        assert!(matches!(
            tingshu.episode_detail("3301_x").await,
            Err(SourceError::BadId(_))
        ));
        assert!(matches!(
            tingshu.episode_detail("3301_4").await,
            Err(SourceError::Fetch { .. })
        ));
    }
}
