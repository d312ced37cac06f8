use chrono::Utc;
use sysjob_dispatcher::cron_utils::CronTrigger;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== CRON触发器演示 ===\n");

    println!("1. 解析quartz风格表达式:");
    let every_minute = CronTrigger::parse("0 * * * * ?")?;
    println!("   每分钟执行: {}", every_minute.expression());
    let daily_2am = CronTrigger::parse("0 0 2 * * ?")?;
    println!("   每天凌晨2点执行: {}", daily_2am.expression());
    let weekday_9am = CronTrigger::parse("0 0 9 * * 1-5")?;
    println!("   工作日9点执行: {}", weekday_9am.expression());

    println!();
    println!("2. 下次触发时间:");
    let now = Utc::now();
    println!("   当前时间: {}", now.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(next_time) = daily_2am.next_fire_time(now) {
        println!(
            "   凌晨2点任务下次触发: {}",
            next_time.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    println!();
    println!("3. 即将到来的触发时间:");
    for (i, time) in weekday_9am.upcoming(now, 5).iter().enumerate() {
        println!("   第{}次: {}", i + 1, time.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    println!();
    println!("4. 积压窗口内的触发时间:");
    let one_hour_ago = now - chrono::Duration::hours(1);
    let backlog = every_minute.fires_between(one_hour_ago, now);
    println!(
        "   过去一小时每分钟任务积压了 {} 次触发，合并后只执行最近一次",
        backlog.len()
    );

    println!();
    println!("5. 表达式校验:");
    for expr in ["0 0 2 * * ?", "0 */5 * * * *", "every day", "* * * * *"] {
        println!("   '{}' -> {}", expr, CronTrigger::validate(expr));
    }

    Ok(())
}
