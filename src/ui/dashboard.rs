//! Terminal dashboard
//!
//! [`DashboardView`] is the presentation sink used in interactive mode: it
//! keeps the last state pushed by the store for each furnace. [`render`]
//! draws that state together with the operator's current selection.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Tabs, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use super::centered_popup;
use crate::colors::StatusPalette;
use crate::furnace::{ControlState, FurnaceId, FurnaceRecord, FurnaceStatus, InputField};
use crate::journal::FurnaceStats;
use crate::presentation::{PresentationSink, Report};

/// Column the form values start at
const LABEL_WIDTH: usize = 20;

/// Last known state of one furnace
#[derive(Debug, Clone, Default)]
pub struct FurnacePanel {
    pub values: [String; 6],
    pub remaining_sheets: u32,
    pub heating_duration: u32,
    pub heating_timer: String,
    pub downtime_timer: String,
    pub status: FurnaceStatus,
    pub controls: ControlState,
    pub stats: FurnaceStats,
    pub journal: Vec<String>,
}

impl FurnacePanel {
    #[must_use]
    pub fn value(&self, field: InputField) -> &str {
        &self.values[field_index(field)]
    }
}

/// Presentation sink backing the dashboard
#[derive(Debug, Clone, Default)]
pub struct DashboardView {
    panels: [FurnacePanel; 3],
    report: Report,
    notice: Option<String>,
}

impl DashboardView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn panel(&self, id: FurnaceId) -> &FurnacePanel {
        &self.panels[id.index()]
    }

    #[must_use]
    pub fn current_report(&self) -> &Report {
        &self.report
    }

    #[must_use]
    pub fn current_notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn clear_notice(&mut self) {
        self.notice = None;
    }

    fn panel_mut(&mut self, id: FurnaceId) -> &mut FurnacePanel {
        &mut self.panels[id.index()]
    }
}

impl PresentationSink for DashboardView {
    fn fields(&mut self, id: FurnaceId, record: &FurnaceRecord) {
        let panel = self.panel_mut(id);
        for field in InputField::ALL {
            panel.values[field_index(field)] = record.input_value(field);
        }
        panel.remaining_sheets = record.remaining_sheets;
        panel.heating_duration = record.heating_duration;
    }

    fn heating_timer(&mut self, id: FurnaceId, text: &str) {
        text.clone_into(&mut self.panel_mut(id).heating_timer);
    }

    fn downtime_timer(&mut self, id: FurnaceId, text: &str) {
        text.clone_into(&mut self.panel_mut(id).downtime_timer);
    }

    fn status(&mut self, id: FurnaceId, status: FurnaceStatus) {
        self.panel_mut(id).status = status;
    }

    fn controls(&mut self, id: FurnaceId, controls: ControlState) {
        self.panel_mut(id).controls = controls;
    }

    fn stats(&mut self, id: FurnaceId, stats: FurnaceStats) {
        self.panel_mut(id).stats = stats;
    }

    fn journal(&mut self, id: FurnaceId, lines: &[String]) {
        self.panel_mut(id).journal = lines.to_vec();
    }

    fn report(&mut self, report: &Report) {
        self.report = report.clone();
    }

    fn notice(&mut self, text: &str) {
        self.notice = Some(text.to_string());
    }
}

/// What the keyboard is currently driving
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Editing { field: InputField, buffer: String },
    ConfirmReset,
    AdminPrompt { buffer: String },
    /// Sign in as another operator; an empty name signs out
    UserPrompt { buffer: String },
    Report,
}

/// Operator selection drawn on top of the view
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub furnace: FurnaceId,
    pub focus: InputField,
    pub mode: &'a InputMode,
    /// Signed-in operator, if any
    pub user: Option<&'a str>,
}

#[must_use]
pub fn status_label(status: FurnaceStatus) -> &'static str {
    match status {
        FurnaceStatus::Inactive => "Остановлена",
        FurnaceStatus::Active => "Нагрев",
        FurnaceStatus::Downtime => "Простой",
    }
}

fn field_index(field: InputField) -> usize {
    InputField::ALL
        .iter()
        .position(|f| *f == field)
        .unwrap_or_default()
}

/// Draw the whole dashboard
pub fn render(f: &mut Frame, view: &DashboardView, selection: Selection<'_>, palette: &StatusPalette) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(10),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(f.size());

    f.render_widget(
        Block::default().style(Style::default().bg(palette.background.into())),
        f.size(),
    );
    render_tabs(f, chunks[0], view, selection, palette);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[1]);
    let panel = view.panel(selection.furnace);
    render_form(f, body[0], panel, selection, palette);
    render_process(f, body[1], panel, palette);
    render_journal(f, chunks[2], panel, palette);
    render_footer(f, chunks[3], panel.controls, palette);

    if let Some(notice) = view.current_notice() {
        let line = Paragraph::new(notice).style(
            Style::default()
                .fg(palette.accent.into())
                .add_modifier(Modifier::BOLD),
        );
        f.render_widget(line, chunks[4]);
    }

    match selection.mode {
        InputMode::ConfirmReset => render_prompt(
            f,
            "Сброс",
            &format!(
                "Сбросить все поля печи {}? (y/n)",
                selection.furnace.label()
            ),
            palette,
        ),
        InputMode::AdminPrompt { buffer } => render_prompt(
            f,
            "Очистка журнала",
            &format!(
                "Пароль администратора: {}_",
                "*".repeat(buffer.chars().count())
            ),
            palette,
        ),
        InputMode::UserPrompt { buffer } => render_prompt(
            f,
            "Оператор",
            &format!("Войти как (пусто = выход): {buffer}_"),
            palette,
        ),
        InputMode::Report => render_report(f, view.current_report(), palette),
        InputMode::Normal | InputMode::Editing { .. } => {}
    }
}

fn render_tabs(
    f: &mut Frame,
    area: Rect,
    view: &DashboardView,
    selection: Selection<'_>,
    palette: &StatusPalette,
) {
    let titles: Vec<Line> = FurnaceId::ALL
        .iter()
        .map(|id| {
            let status = view.panel(*id).status;
            Line::from(vec![
                Span::styled("● ", Style::default().fg(palette.for_status(status).into())),
                Span::raw(format!("{} ", id.label())),
            ])
        })
        .collect();

    let title = match selection.user {
        Some(user) => format!(" Печи · {user} "),
        None => " Печи · без входа, данные не сохраняются ".to_string(),
    };
    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title(title))
        .select(selection.furnace.index())
        .style(Style::default().fg(palette.text.into()))
        .highlight_style(
            Style::default()
                .fg(palette.accent.into())
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(tabs, area);
}

fn render_form(
    f: &mut Frame,
    area: Rect,
    panel: &FurnacePanel,
    selection: Selection<'_>,
    palette: &StatusPalette,
) {
    let locked = !panel.controls.inputs_enabled;
    let lines: Vec<Line> = InputField::ALL
        .iter()
        .map(|field| {
            let focused = *field == selection.focus;
            let value = match selection.mode {
                InputMode::Editing { field: editing, buffer } if editing == field => {
                    format!("{buffer}_")
                }
                _ => panel.value(*field).to_string(),
            };
            let mut style = Style::default().fg(palette.text.into());
            if locked {
                style = style.add_modifier(Modifier::DIM);
            }
            if focused {
                style = style.fg(palette.accent.into()).add_modifier(Modifier::BOLD);
            }
            let marker = if focused { "> " } else { "  " };
            let label = field.label();
            let pad = " ".repeat(LABEL_WIDTH.saturating_sub(label.width()));
            Line::from(Span::styled(
                format!("{marker}{label}{pad} {value}"),
                style,
            ))
        })
        .collect();

    let title = if locked {
        " Параметры (заблокированы) "
    } else {
        " Параметры "
    };
    let form = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(form, area);
}

fn render_process(f: &mut Frame, area: Rect, panel: &FurnacePanel, palette: &StatusPalette) {
    let status_style = Style::default()
        .fg(palette.for_status(panel.status).into())
        .add_modifier(Modifier::BOLD);
    let text = Style::default().fg(palette.text.into());

    let lines = vec![
        Line::from(Span::styled(status_label(panel.status), status_style)),
        Line::from(Span::styled(format!("Нагрев листа:   {}", panel.heating_timer), text)),
        Line::from(Span::styled(format!("Простой:        {}", panel.downtime_timer), text)),
        Line::from(Span::styled(format!("Осталось листов: {}", panel.remaining_sheets), text)),
        Line::from(Span::styled(format!("Цикл, с:        {}", panel.heating_duration), text)),
        Line::from(Span::styled(format!("Выдано листов:  {}", panel.stats.total_sheets), text)),
        Line::from(Span::styled(
            format!("Простой, мин:   {}", panel.stats.total_downtime_minutes),
            text,
        )),
    ];
    let block = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Процесс "));
    f.render_widget(block, area);
}

fn render_journal(f: &mut Frame, area: Rect, panel: &FurnacePanel, palette: &StatusPalette) {
    // Newest entries at the bottom, keep the tail visible
    let visible = usize::from(area.height.saturating_sub(2));
    let skip = panel.journal.len().saturating_sub(visible);
    let items: Vec<ListItem> = panel
        .journal
        .iter()
        .skip(skip)
        .map(|line| ListItem::new(line.as_str()))
        .collect();

    let list = List::new(items)
        .style(Style::default().fg(palette.text.into()))
        .block(Block::default().borders(Borders::ALL).title(" Журнал "));
    f.render_widget(list, area);
}

fn render_footer(f: &mut Frame, area: Rect, controls: ControlState, palette: &StatusPalette) {
    let hint = |key: &str, label: &str, enabled: bool| {
        let style = if enabled {
            Style::default().fg(palette.text.into())
        } else {
            Style::default().fg(palette.inactive.into()).add_modifier(Modifier::DIM)
        };
        Span::styled(format!("[{key}] {label}  "), style)
    };

    let footer = Paragraph::new(Line::from(vec![
        hint("Enter", "Ввод", controls.inputs_enabled),
        hint("s", "Старт", controls.start_enabled),
        hint("d", "Простой", controls.downtime_start_enabled),
        hint("e", "Конец простоя", controls.downtime_end_enabled),
        hint("r", "Сброс", true),
        hint("p", "Отчет", true),
        hint("t", "Тема", true),
        hint("u", "Оператор", true),
        hint("q", "Выход", true),
    ]));
    f.render_widget(footer, area);
}

fn render_prompt(f: &mut Frame, title: &str, text: &str, palette: &StatusPalette) {
    let area = centered_popup(f.size(), 50, 5);
    let prompt = Paragraph::new(text)
        .style(Style::default().fg(palette.text.into()))
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {title} "))
                .border_style(Style::default().fg(palette.accent.into())),
        );
    f.render_widget(Clear, area);
    f.render_widget(prompt, area);
}

fn render_report(f: &mut Frame, report: &Report, palette: &StatusPalette) {
    let area = centered_popup(f.size(), 100, 40);
    let mut lines = Vec::new();
    for section in &report.sections {
        lines.push(Line::from(Span::styled(
            section.heading.as_str(),
            Style::default()
                .fg(palette.accent.into())
                .add_modifier(Modifier::BOLD),
        )));
        lines.extend(section.lines.iter().map(|l| Line::from(l.as_str())));
        lines.push(Line::default());
    }
    let widget = Paragraph::new(lines)
        .style(Style::default().fg(palette.text.into()))
        .block(Block::default().borders(Borders::ALL).title(" Отчет "));
    f.render_widget(Clear, area);
    f.render_widget(widget, area);
}
