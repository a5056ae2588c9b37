use chrono::Utc;
use dashboard_client::{PortfolioMetrics, PortfolioSummary, RiskAdjustments, TradeStats};
use rust_decimal::Decimal;

/// Combine the three portfolio resources into one metrics view.
///
/// - `total_pnl` is the summary's `total_gain`.
/// - `portfolio_value` is the risk resource's `account_balance`, never a sum
///   over positions.
/// - `win_rate` is a percentage: a precomputed fraction times 100, or the
///   share of trades with positive realized P&L. Zero trades gives 0.
/// - `daily_pnl_percent` is `total_pnl / account_balance * 100`, or 0 when
///   the balance is not positive.
///
/// Every division and scaling is checked: a ratio that does not fit a
/// `Decimal` is logged and reported as 0.
pub fn derive_metrics(
    summary: &PortfolioSummary,
    risk: &RiskAdjustments,
    stats: &TradeStats,
) -> PortfolioMetrics {
    let total_pnl = summary.total_gain();
    let account_balance = risk.account_balance();
    let (win_rate, total_trades) = win_rate(stats);

    let daily_pnl_percent = if account_balance > Decimal::ZERO {
        percent_of(total_pnl, account_balance).unwrap_or_else(|| {
            tracing::warn!(
                total_pnl = %total_pnl,
                account_balance = %account_balance,
                "Daily P&L percent out of range, reporting 0"
            );
            Decimal::ZERO
        })
    } else {
        Decimal::ZERO
    };

    PortfolioMetrics {
        total_pnl,
        portfolio_value: account_balance,
        win_rate,
        total_trades,
        open_positions: summary.total_positions(),
        daily_pnl_percent,
        computed_at: Utc::now(),
    }
}

fn win_rate(stats: &TradeStats) -> (Decimal, u64) {
    match stats {
        TradeStats::Precomputed {
            win_rate,
            total_trades,
        } => {
            let rate = win_rate.checked_mul(Decimal::ONE_HUNDRED).unwrap_or_else(|| {
                tracing::warn!(win_rate = %win_rate, "Win rate out of range, reporting 0");
                Decimal::ZERO
            });
            (rate, *total_trades)
        }
        TradeStats::Trades(trades) if trades.is_empty() => (Decimal::ZERO, 0),
        TradeStats::Trades(trades) => {
            let winners = trades.iter().filter(|t| t.is_winner()).count();
            let total = trades.len() as u64;
            let rate = percent_of(Decimal::from(winners as u64), Decimal::from(total))
                .unwrap_or(Decimal::ZERO);
            (rate, total)
        }
    }
}

/// `part / whole * 100`, or `None` when it overflows or `whole` is zero.
fn percent_of(part: Decimal, whole: Decimal) -> Option<Decimal> {
    part.checked_div(whole)?.checked_mul(Decimal::ONE_HUNDRED)
}
