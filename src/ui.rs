use std::time::Duration;

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Style, Stylize},
    symbols::border,
    text::{Line, Span, Text},
    widgets::{Block, Clear, Paragraph, Row, Table, Tabs, Wrap},
};

use crate::domain::{PainelError, UiConfig};
use crate::model::{Model, Tab};
use crate::table::TableData;
use crate::views::{CategoryCount, DashboardViews};

pub const HEADER_HEIGHT: u16 = 3;
pub const STATUSLINE_HEIGHT: u16 = 1;
pub const METRIC_HEIGHT: u16 = 5;
pub const MAX_COLUMN_WIDTH: usize = 40;
pub const NARROW_LAYOUT_WIDTH: u16 = 100;
// Status messages fade after this long.
const STATUS_MESSAGE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct TableUI {
    config: UiConfig,
}

impl TableUI {
    pub fn new(config: &UiConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn draw(&self, model: &Model, frame: &mut Frame) {
        let chunks = Layout::vertical([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Min(0),
            Constraint::Length(STATUSLINE_HEIGHT),
        ])
        .split(frame.area());

        self.draw_tabs(model, frame, chunks[0]);
        let body = self.body_area(chunks[1]);
        match model.views() {
            Some(views) => self.draw_view(model, views, frame, body),
            None => {
                let text = Text::from(vec![
                    Line::from("Nenhuma planilha carregada."),
                    Line::from(vec![
                        "Pressione ".into(),
                        "<o>".blue().bold(),
                        " para abrir um arquivo.".into(),
                    ]),
                ]);
                frame.render_widget(
                    Paragraph::new(text).centered().block(Block::bordered()),
                    body,
                );
            }
        }
        self.draw_statusline(model, frame, chunks[2]);

        if model.show_popup() {
            self.draw_popup(model.popup_message(), frame);
        }
    }

    fn body_area(&self, area: Rect) -> Rect {
        if self.config.wide_layout || area.width <= NARROW_LAYOUT_WIDTH {
            return area;
        }
        let margin = (area.width - NARROW_LAYOUT_WIDTH) / 2;
        Rect::new(area.x + margin, area.y, NARROW_LAYOUT_WIDTH, area.height)
    }

    fn draw_tabs(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let (icon, page_title) = (&self.config.page_icon, &self.config.page_title);
        let title = match model.dataset() {
            Some(ds) => format!(" {icon} {page_title} · {} ", ds.name()),
            None => format!(" {icon} {page_title} "),
        };
        let titles: Vec<String> = Tab::ALL
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{} {}", i + 1, t.title()))
            .collect();
        let tabs = Tabs::new(titles)
            .select(model.tab().index())
            .highlight_style(Style::new().yellow().bold())
            .block(
                Block::bordered()
                    .title(Line::from(title.bold()).centered())
                    .border_set(border::THICK),
            );
        frame.render_widget(tabs, area);
    }

    fn draw_view(&self, model: &Model, views: &DashboardViews, frame: &mut Frame, area: Rect) {
        let tab = model.tab();
        match tab {
            Tab::Dataset => {
                let summary = model.summary_table();
                let summary_height = (summary.nrows() as u16 + 3).min(area.height / 3).max(4);
                let chunks =
                    Layout::vertical([Constraint::Length(summary_height), Constraint::Min(0)])
                        .split(area);
                let title = format!(
                    " Informações: {} linhas, {} colunas ",
                    views.summary.rows,
                    views.summary.columns.len()
                );
                draw_table(frame, chunks[0], summary, 0, title);
                self.draw_tab_table(model, frame, chunks[1], " Conteúdo ".to_string());
            }
            Tab::Status => match &views.status {
                Ok(counts) => self.draw_status(model, counts, frame, area),
                Err(e) => draw_error(frame, area, e),
            },
            Tab::Breakdown => match &views.breakdown {
                Ok(_) => self.draw_tab_table(
                    model,
                    frame,
                    area,
                    " Contagem de Processos por Responsável e Status ".to_string(),
                ),
                Err(e) => draw_error(frame, area, e),
            },
            Tab::Queue => match &views.queue {
                Ok(queue) => {
                    let chunks = metric_layout(area);
                    draw_metric(frame, chunks[0], "Processos a Distribuir", queue.count() as u64);
                    self.draw_tab_table(
                        model,
                        frame,
                        chunks[1],
                        " Processos que Devem Ser Distribuídos ".to_string(),
                    );
                }
                Err(e) => draw_error(frame, area, e),
            },
            Tab::Expired => match &views.expired {
                Ok(expired) => {
                    let chunks = metric_layout(area);
                    draw_metric(frame, chunks[0], "Adimplência Vencida", expired.count() as u64);
                    let title = format!(
                        " Vencidos em {} ",
                        views.computed_at.format("%d/%m/%Y %H:%M")
                    );
                    self.draw_tab_table(model, frame, chunks[1], title);
                }
                Err(e) => draw_error(frame, area, e),
            },
            Tab::Analyst => match (&views.analyst_choices, &views.analyst) {
                (Ok(_), Ok(rows)) => {
                    let chunks =
                        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).split(area);
                    self.draw_selector(model, frame, chunks[0]);
                    let title = format!(" {} processos ", rows.count());
                    self.draw_tab_table(model, frame, chunks[1], title);
                }
                (Err(e), _) | (_, Err(e)) => draw_error(frame, area, e),
            },
        }
    }

    fn draw_tab_table(&self, model: &Model, frame: &mut Frame, area: Rect, title: String) {
        let tab = model.tab();
        match model.table(tab) {
            Some(table) => draw_table(frame, area, table, model.offset(tab), title),
            None => frame.render_widget(Block::bordered().title(title), area),
        }
    }

    fn draw_status(&self, model: &Model, counts: &CategoryCount, frame: &mut Frame, area: Rect) {
        let statuses = &model.config().allowed_statuses;
        if statuses.is_empty() {
            return;
        }
        let constraints = statuses.iter().map(|_| Constraint::Ratio(1, statuses.len() as u32));
        let chunks = if self.config.wide_layout {
            Layout::horizontal(constraints).split(area)
        } else {
            Layout::vertical(constraints).split(area)
        };
        for (status, chunk) in statuses.iter().zip(chunks.iter()) {
            let height = METRIC_HEIGHT.min(chunk.height);
            let metric_area = Rect::new(chunk.x, chunk.y, chunk.width, height);
            draw_metric(frame, metric_area, status, counts.get(status));
        }
    }

    fn draw_selector(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let options = model.analyst_options();
        let current = model.selection().label(model.config());
        let position = model.analyst_position();
        let line = Line::from(vec![
            "◀ ".blue().bold(),
            Span::styled(current.to_string(), Style::new().bold()),
            " ▶".blue().bold(),
            format!("  ({}/{})", position + 1, options.len()).into(),
        ]);
        let block = Block::bordered().title(" Selecione um Analista ");
        frame.render_widget(Paragraph::new(line).centered().block(block), area);
    }

    fn draw_statusline(&self, model: &Model, frame: &mut Frame, area: Rect) {
        if let Some(prompt) = model.prompt() {
            let label = "Abrir arquivo: ";
            let line = Line::from(vec![label.bold(), prompt.text.clone().into()]);
            frame.render_widget(Paragraph::new(line), area);
            let x = area.x + (label.chars().count() + prompt.cursor) as u16;
            frame.set_cursor_position((x.min(area.right().saturating_sub(1)), area.y));
            return;
        }
        let message = if model.status_message_age() < STATUS_MESSAGE_TTL {
            model.status_message().to_string().yellow()
        } else {
            model.status_message().to_string().dark_gray()
        };
        let line = Line::from(vec![message, "  <?> ajuda  <q> sair".dark_gray()]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_popup(&self, message: &str, frame: &mut Frame) {
        let area = frame.area();
        let height = (message.lines().count() as u16 + 2).min(area.height);
        let longest = message.lines().map(|l| l.chars().count()).max().unwrap_or(0);
        let width = (longest as u16 + 4).min(area.width);
        let popup = Rect::new(
            area.x + (area.width - width) / 2,
            area.y + (area.height - height) / 2,
            width,
            height,
        );
        frame.render_widget(Clear, popup);
        let block = Block::bordered()
            .title(Line::from(" Ajuda ".bold()).centered())
            .title_bottom(Line::from(" <Esc> ").centered());
        frame.render_widget(Paragraph::new(message.to_string()).block(block), popup);
    }
}

fn metric_layout(area: Rect) -> std::rc::Rc<[Rect]> {
    Layout::vertical([Constraint::Length(METRIC_HEIGHT), Constraint::Min(0)]).split(area)
}

fn draw_metric(frame: &mut Frame, area: Rect, label: &str, value: u64) {
    let text = Text::from(vec![Line::from(""), Line::from(value.to_string().bold().cyan())]);
    let block = Block::bordered()
        .title(Line::from(format!(" {label} ").bold()).centered())
        .border_set(border::ROUNDED);
    frame.render_widget(Paragraph::new(text).centered().block(block), area);
}

fn draw_error(frame: &mut Frame, area: Rect, error: &PainelError) {
    let block = Block::bordered().title(" Indisponível ".red().bold());
    let paragraph = Paragraph::new(error.to_string().red())
        .wrap(Wrap { trim: true })
        .block(block);
    frame.render_widget(paragraph, area);
}

fn draw_table(frame: &mut Frame, area: Rect, table: &TableData, offset: usize, title: String) {
    // Borders and the header row.
    let visible = area.height.saturating_sub(3) as usize;
    let end = (offset + visible).min(table.nrows());
    let rows: Vec<Row> = (offset..end)
        .map(|idx| Row::new(table.row(idx).into_iter().map(str::to_string).collect::<Vec<_>>()))
        .collect();
    let widths: Vec<Constraint> = table
        .columns
        .iter()
        .map(|c| Constraint::Length(c.width.min(MAX_COLUMN_WIDTH) as u16))
        .collect();
    let header = Row::new(table.headers().map(str::to_string).collect::<Vec<String>>())
        .style(Style::new().bold().underlined());
    let position = if table.nrows() == 0 {
        " 0/0 ".to_string()
    } else {
        format!(" {}-{}/{} ", offset + 1, end, table.nrows())
    };
    let block = Block::bordered()
        .title(Line::from(title.bold()))
        .title_bottom(Line::from(position).right_aligned());
    frame.render_widget(Table::new(rows, widths).header(header).block(block), area);
}
