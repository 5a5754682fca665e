//! 与教学管理系统的会话：登录握手、会话校验与数据抓取。
//!
//! Cookie 罐只归本模块所有，所有读写 cookie 的请求都经由同一个
//! [`Session`] 串行发出。

use std::{
    collections::BTreeMap,
    sync::{Arc, LazyLock},
    time::Duration,
};

use regex::Regex;
use reqwest::{
    Client, StatusCode, Url,
    cookie::Jar,
    header::{HeaderMap, HeaderValue, SET_COOKIE},
    redirect,
};
use scraper::{Html, Selector};

use crate::{
    Credentials, CourseRecord, Error, Exam, PortalConfig, Result,
    parser::{parse_courses, parse_exams, parse_terms},
};

/// 教学管理系统的路由
mod routes {
    pub const HOME: &str = "/home.aspx";
    pub const LOGIN: &str = "/_data/index_login.aspx";
    pub const LOGIN_TEST: &str = "/sys/Main_banner.aspx";
    /// 个人课表（学期列表页）
    pub const COURSE_TERMS: &str = "/znpk/Pri_StuSel.aspx";
    /// 查询个人课表
    pub const COURSE_TABLE: &str = "/znpk/Pri_StuSel_rpt.aspx";
    /// 考试安排（学期列表页）
    pub const EXAM_TERMS: &str = "/kssw/stu_ksap.aspx";
    /// 查询考试安排
    pub const EXAM_TABLE: &str = "/kssw/stu_ksap_rpt.aspx";
}

/// 登录成功页的标志
const SUCCESS_MARKER: &str = "正在加载权限数据...";
const BAD_CREDENTIALS_MARKER: &str = "账号或密码不正确！请重新输入。";
const NO_ROLE_MARKER: &str = "该账号尚未分配角色!";
/// 数据页过期标志，出现即意味着需要重新登录
const EXPIRED_MARKER: &str = "您正查看的此页已过期";

/// 学校代码，参与登录摘要的计算
const SCHOOL_CODE: &str = "10611";

/// 设置引导 cookie 后必须等待的时间，教务网会拒绝无间隔的请求
const BOOTSTRAP_PACING: Duration = Duration::from_millis(680);

static RE_DSAFE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"document\.cookie='DSafeId=([A-Z0-9]+);';").unwrap());
static RE_SESSION_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ASP\.NET_SessionId=([a-zA-Z0-9]+);").unwrap());
static RE_D_SID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_D_SID=([A-Z0-9]+);").unwrap());

fn md5_upper(input: &str) -> String {
    format!("{:X}", md5::compute(input))
}

/// 登录摘要：代替明文密码提交的派生值。
///
/// `upper(md5(学号 + upper(md5(密码))[0..30] + 学校代码))[0..30]`
pub fn credential_digest(username: &str, password: &str) -> String {
    let inner = md5_upper(password);
    let digest = md5_upper(&format!("{}{}{}", username, &inner[..30], SCHOOL_CODE));
    digest[..30].to_string()
}

/// 按固定优先级对登录返回页分类。
///
/// 角色未分配的判定先于密码错误：同一页面同时出现两种文案时，
/// 更具体的诊断优先。无法识别的页面绝不按成功处理。
fn classify_login(body: &str) -> Result<()> {
    if body.contains(SUCCESS_MARKER) {
        return Ok(());
    }
    if body.contains(NO_ROLE_MARKER) {
        return Err(Error::NoSuchUser);
    }
    if body.contains(BAD_CREDENTIALS_MARKER) {
        return Err(Error::InvalidCredentials);
    }
    Err(Error::UnexpectedPortalResponse(excerpt(body)))
}

fn excerpt(body: &str) -> String {
    body.trim().chars().take(120).collect()
}

fn ensure_live(body: &str) -> Result<()> {
    if body.contains(EXPIRED_MARKER) {
        Err(Error::SessionExpired)
    } else {
        Ok(())
    }
}

fn default_headers(base_url: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));
    headers.insert("Cache-Control", HeaderValue::from_static("max-age=0"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
    headers.insert(
        "Accept",
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(
        "Accept-Language",
        HeaderValue::from_static("zh-CN,zh;q=0.9"),
    );
    headers.insert(
        "Referer",
        HeaderValue::from_str(base_url)
            .map_err(|_| Error::Config(format!("invalid base url: {base_url}")))?,
    );
    Ok(headers)
}

/// 会话使用的 HTTP 传输层：两个共享 cookie 罐的客户端。
///
/// [`Session::open`] 会按 [`PortalConfig`] 自动构建；测试时可以单独
/// 构建并通过 [`Session::with_transport`] 注入，把请求指向本地桩服务。
pub struct Transport {
    client: Client,
    /// 与 `client` 共享 cookie 罐，但禁用重定向，用于会话有效性探测
    probe: Client,
    jar: Arc<Jar>,
}

impl Transport {
    pub fn from_config(config: &PortalConfig) -> Result<Self> {
        let headers = default_headers(&config.base_url)?;
        let jar = Arc::new(Jar::default());

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers.clone())
            .cookie_provider(jar.clone())
            .timeout(config.timeout)
            .build()?;
        let probe = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .cookie_provider(jar.clone())
            .timeout(config.timeout)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self { client, probe, jar })
    }
}

/// 一次已登录（或待登录）的教务网会话。
pub struct Session {
    client: Client,
    probe: Client,
    jar: Arc<Jar>,
    base: Url,
    authenticated: bool,
}

impl Session {
    /// 建立会话并完成登录握手。
    ///
    /// 失败时返回 [`Error::InvalidCredentials`]、[`Error::NoSuchUser`] 或
    /// [`Error::UnexpectedPortalResponse`]，一律不自动重试——反复的失败
    /// 尝试可能触发教务网锁定账号。
    pub async fn open(credentials: &Credentials, config: PortalConfig) -> Result<Self> {
        let transport = Transport::from_config(&config)?;
        let mut session = Self::with_transport(transport, &config.base_url)?;
        session.login(credentials).await?;
        Ok(session)
    }

    /// 基于注入的传输层建立未登录的会话。
    pub fn with_transport(transport: Transport, base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|_| Error::Config(format!("invalid base url: {base_url}")))?;
        Ok(Self {
            client: transport.client,
            probe: transport.probe,
            jar: transport.jar,
            base,
            authenticated: false,
        })
    }

    fn url(&self, path: &str) -> Url {
        self.base
            .join(path)
            .expect("portal route paths are valid URL fragments")
    }

    /// 执行登录握手。成功后 [`Session::is_open`] 返回 `true`。
    pub async fn login(&mut self, credentials: &Credentials) -> Result<()> {
        tracing::info!(username = %credentials.username, "logging into jxgl portal");
        self.bootstrap_cookies().await?;

        // 读取登录表单中的防伪标记
        let login_url = self.url(routes::LOGIN);
        let form_html = self
            .client
            .get(login_url.clone())
            .send()
            .await
            .map_err(Error::from_transport)?
            .text()
            .await
            .map_err(Error::from_transport)?;
        let (viewstate, generator) = extract_form_tokens(&form_html)?;

        let digest = credential_digest(&credentials.username, &credentials.password);
        // 字段名由教务网混淆生成，按原样保留；密码字段留空，
        // 实际提交的是摘要
        let form = [
            ("__VIEWSTATE", viewstate.as_str()),
            ("__VIEWSTATEGENERATOR", generator.as_str()),
            ("Sel_Type", "STU"),
            ("txt_dsdsdsdjkjkjc", credentials.username.as_str()),
            ("txt_dsdfdfgfouyy", ""),
            ("txt_ysdsdsdskgf", ""),
            ("pcInfo", ""),
            ("typeName", ""),
            ("aerererdsdxcxdfgfg", ""),
            ("efdfdfuuyyuuckjg", digest.as_str()),
        ];

        let body = self
            .client
            .post(login_url)
            .form(&form)
            .send()
            .await
            .map_err(Error::from_transport)?
            .text_with_charset("GBK")
            .await
            .map_err(Error::from_transport)?;

        classify_login(&body)?;
        self.authenticated = true;
        tracing::info!(username = %credentials.username, "login succeeded");
        Ok(())
    }

    /// 初始化 cookie。
    ///
    /// 首页偶尔不带跳转脚本、直接放行，此时整个引导步骤跳过；这一
    /// 条件分支与教务网的实际行为一致，不能当作死代码删除。
    async fn bootstrap_cookies(&self) -> Result<()> {
        let home = self.url(routes::HOME);
        let body = self
            .client
            .get(home.clone())
            .send()
            .await
            .map_err(Error::from_transport)?
            .text()
            .await
            .map_err(Error::from_transport)?;

        let Some(caps) = RE_DSAFE_ID.captures(&body) else {
            tracing::debug!("home page granted a session without the cookie bootstrap");
            return Ok(());
        };
        self.jar
            .add_cookie_str(&format!("DSafeId={}", &caps[1]), &self.base);
        tokio::time::sleep(BOOTSTRAP_PACING).await;

        let response = self
            .client
            .get(home)
            .send()
            .await
            .map_err(Error::from_transport)?;
        let set_cookie = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join("; ");

        let session_id = RE_SESSION_ID
            .captures(&set_cookie)
            .ok_or_else(|| Error::UnexpectedPortalResponse(excerpt(&set_cookie)))?;
        let d_sid = RE_D_SID
            .captures(&set_cookie)
            .ok_or_else(|| Error::UnexpectedPortalResponse(excerpt(&set_cookie)))?;
        self.jar
            .add_cookie_str(&format!("ASP.NET_SessionId={}", &session_id[1]), &self.base);
        self.jar
            .add_cookie_str(&format!("_D_SID={}", &d_sid[1]), &self.base);
        tracing::debug!("cookie bootstrap completed");
        Ok(())
    }

    /// 会话是否仍然有效。
    ///
    /// 对受登录保护的页面发一次禁用重定向的 GET：返回 200 说明有效，
    /// 任何重定向都意味着已过期。
    pub async fn is_authenticated(&self) -> Result<bool> {
        let response = self
            .probe
            .get(self.url(routes::LOGIN_TEST))
            .send()
            .await
            .map_err(Error::from_transport)?;
        Ok(response.status() == StatusCode::OK)
    }

    /// 登录握手是否已经完成。
    pub fn is_open(&self) -> bool {
        self.authenticated
    }

    /// 课程表的学期列表：{学期编号: 学期名称}
    pub async fn course_terms(&self) -> Result<BTreeMap<i32, String>> {
        let html = self.get_text(routes::COURSE_TERMS).await?;
        ensure_live(&html)?;
        parse_terms(&html, "Sel_XNXQ")
    }

    /// 考试安排的学期列表：{学期编号: 学期名称}
    pub async fn exam_terms(&self) -> Result<BTreeMap<i32, String>> {
        let html = self.get_text(routes::EXAM_TERMS).await?;
        ensure_live(&html)?;
        parse_terms(&html, "sel_xnxq")
    }

    /// 指定学期的课程表。
    pub async fn courses(&self, term_id: i32) -> Result<Vec<CourseRecord>> {
        let term = term_id.to_string();
        let form = [("Sel_XNXQ", term.as_str()), ("px", "0"), ("rad", "on")];
        let html = self.post_text(routes::COURSE_TABLE, &form).await?;
        ensure_live(&html)?;
        tracing::debug!(term_id, "fetched course table");
        parse_courses(&html)
    }

    /// 指定学期的考试安排。
    pub async fn exams(&self, term_id: i32) -> Result<Vec<Exam>> {
        let term = term_id.to_string();
        let form = [("sel_xnxq", term.as_str())];
        let html = self.post_text(routes::EXAM_TABLE, &form).await?;
        ensure_live(&html)?;
        tracing::debug!(term_id, "fetched exam table");
        parse_exams(&html)
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        self.client
            .get(self.url(path))
            .send()
            .await
            .map_err(Error::from_transport)?
            .text()
            .await
            .map_err(Error::from_transport)
    }

    async fn post_text(&self, path: &str, form: &[(&str, &str)]) -> Result<String> {
        self.client
            .post(self.url(path))
            .form(form)
            .send()
            .await
            .map_err(Error::from_transport)?
            .text()
            .await
            .map_err(Error::from_transport)
    }
}

/// 从登录页的 `#Logon` 表单提取两个隐藏防伪标记。
fn extract_form_tokens(html: &str) -> Result<(String, String)> {
    let document = Html::parse_document(html);
    let token = |name: &str| -> Result<String> {
        let sel = Selector::parse(&format!("#Logon input[name=\"{name}\"]"))
            .expect("selector literal is valid CSS");
        document
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("value"))
            .map(str::to_string)
            .ok_or_else(|| Error::UnexpectedPortalResponse(format!("登录页缺少 {name} 字段")))
    };
    Ok((token("__VIEWSTATE")?, token("__VIEWSTATEGENERATOR")?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic_and_input_sensitive() {
        let a = credential_digest("20200001", "password");
        let b = credential_digest("20200001", "password");
        assert_eq!(a, b);
        assert_eq!(a.len(), 30);
        assert!(a.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_ne!(a, credential_digest("20200002", "password"));
        assert_ne!(a, credential_digest("20200001", "Password"));
    }

    #[test]
    fn login_success_marker_wins() {
        assert!(classify_login("<html>正在加载权限数据...</html>").is_ok());
    }

    #[test]
    fn no_role_marker_takes_priority_over_bad_credentials() {
        let body = format!("<html>{NO_ROLE_MARKER} {BAD_CREDENTIALS_MARKER}</html>");
        assert!(matches!(classify_login(&body), Err(Error::NoSuchUser)));
    }

    #[test]
    fn bad_credentials_marker_is_invalid_credentials() {
        let body = format!("<html>{BAD_CREDENTIALS_MARKER}</html>");
        assert!(matches!(classify_login(&body), Err(Error::InvalidCredentials)));
    }

    #[test]
    fn unknown_page_is_never_treated_as_success() {
        assert!(matches!(
            classify_login("<html>服务器维护中</html>"),
            Err(Error::UnexpectedPortalResponse(_))
        ));
    }

    #[test]
    fn expired_marker_raises_session_expired() {
        assert!(matches!(
            ensure_live("您正查看的此页已过期"),
            Err(Error::SessionExpired)
        ));
        assert!(ensure_live("<table></table>").is_ok());
    }

    #[test]
    fn bootstrap_pattern_matches_redirect_script() {
        let body = "<script>document.cookie='DSafeId=3CA86FE2B90D;';</script>";
        assert_eq!(&RE_DSAFE_ID.captures(body).unwrap()[1], "3CA86FE2B90D");
        assert!(RE_DSAFE_ID.captures("<html>正常主页</html>").is_none());
    }

    #[test]
    fn session_cookies_extract_from_raw_header() {
        let header = "ASP.NET_SessionId=abc123XYZ; path=/; _D_SID=FFA0B1; HttpOnly";
        assert_eq!(&RE_SESSION_ID.captures(header).unwrap()[1], "abc123XYZ");
        assert_eq!(&RE_D_SID.captures(header).unwrap()[1], "FFA0B1");
    }

    /// 起一个本地桩服务，按请求首行返回画好的响应。
    async fn spawn_stub<F>(respond: F) -> String
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]).to_string();
                let _ = socket.write_all(respond(&head).as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    fn http_ok(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn stub_session(base: &str) -> Session {
        let config = PortalConfig {
            base_url: base.to_string(),
            ..PortalConfig::default()
        };
        Session::with_transport(Transport::from_config(&config).unwrap(), base).unwrap()
    }

    #[tokio::test]
    async fn injected_transport_starts_closed_and_probes_locally() {
        let base = spawn_stub(|_| http_ok("")).await;
        let session = stub_session(&base);
        assert!(!session.is_open());
        assert!(session.is_authenticated().await.unwrap());
    }

    #[tokio::test]
    async fn probe_counts_redirects_as_expired() {
        let base = spawn_stub(|_| {
            "HTTP/1.1 302 Found\r\nLocation: /_data/index.aspx\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string()
        })
        .await;
        let session = stub_session(&base);
        assert!(!session.is_authenticated().await.unwrap());
    }

    #[tokio::test]
    async fn login_handshake_runs_against_an_injected_transport() {
        let base = spawn_stub(|head| {
            if head.starts_with("GET /home.aspx") {
                // 无跳转脚本，直接放行
                http_ok("<html>正常主页</html>")
            } else if head.starts_with("GET /_data/index_login.aspx") {
                http_ok(concat!(
                    "<form id=\"Logon\">",
                    "<input name=\"__VIEWSTATE\" value=\"dDwtMTA=\" />",
                    "<input name=\"__VIEWSTATEGENERATOR\" value=\"CA0B0334\" />",
                    "</form>",
                ))
            } else if head.starts_with("POST /_data/index_login.aspx") {
                http_ok("<html>正在加载权限数据...</html>")
            } else {
                http_ok("")
            }
        })
        .await;

        let mut session = stub_session(&base);
        session
            .login(&Credentials::new("20200001", "pw"))
            .await
            .unwrap();
        assert!(session.is_open());
    }

    #[test]
    fn form_tokens_come_from_hidden_inputs() {
        let html = r#"
        <form id="Logon">
          <input name="__VIEWSTATE" value="dDwtMTA=" />
          <input name="__VIEWSTATEGENERATOR" value="CA0B0334" />
        </form>
        "#;
        let (vs, generator) = extract_form_tokens(html).unwrap();
        assert_eq!(vs, "dDwtMTA=");
        assert_eq!(generator, "CA0B0334");
        assert!(matches!(
            extract_form_tokens("<html></html>"),
            Err(Error::UnexpectedPortalResponse(_))
        ));
    }
}
